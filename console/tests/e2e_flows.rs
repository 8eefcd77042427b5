mod common;

use common::TestEnv;
use predicates::str::contains;
use stub_api::ScriptedRun;

#[test]
fn submitting_adds_a_run_without_dropping_existing_ones() {
    let env = TestEnv::new();
    env.stub.script_run(
        ScriptedRun::new(1, "old.example")
            .statuses(&["COMPLETED"])
            .created_at("2025-08-20T08:00:00Z")
            .report_token("tok-old-1234"),
    );

    env.cmd().args(["submit", "new.example"]).assert().success();
    let run_id = env.stub.last_created_run_id().expect("created run");

    let assert = env.cmd().arg("list").assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    // The new run is first (it is newer) and the old one is intact.
    let fresh = stdout.find(&format!("runId={run_id}")).expect("new row");
    let old = stdout.find("runId=1 ").expect("old row");
    assert!(fresh < old);
    assert!(stdout.contains("report=tok-old-1234"));
    assert!(stdout.contains("[queued]"));
}

#[test]
fn submit_watch_follows_the_run_to_completion() {
    let env = TestEnv::new();
    env.stub
        .set_create_script(&["QUEUED", "RUNNING", "COMPLETED"]);
    env.stub.set_create_result_json(r#"{"scores":{"global":72}}"#);
    env.stub.set_create_report_token("tok-fresh-1234");

    env.cmd()
        .args(["submit", "fresh.example", "--watch", "--interval-ms", "25"])
        .assert()
        .success()
        .stdout(contains("audit created:"))
        .stdout(contains("[completed]"))
        .stdout(contains("\"global\": 72"))
        .stdout(contains("report ready: audit-console report tok-fresh-1234"));

    let run_id = env.stub.last_created_run_id().expect("created run");
    // One poll per scripted status, none after the terminal one.
    assert_eq!(env.stub.polls_for(run_id), 3);
}

#[test]
fn submit_watch_surfaces_the_failure_reason() {
    let env = TestEnv::new();
    env.stub.set_create_script(&["QUEUED", "FAILED"]);
    env.stub.set_create_last_error("analysis timed out");

    env.cmd()
        .args(["submit", "flaky.example", "--watch", "--interval-ms", "25"])
        .assert()
        .success()
        .stdout(contains("[failed]"))
        .stdout(contains("run failed: analysis timed out"));
}

#[test]
fn submit_watch_json_emits_the_final_entry_only() {
    let env = TestEnv::new();
    env.stub.set_create_script(&["RUNNING", "COMPLETED"]);
    env.stub.set_create_report_token("tok-json-1234");

    let entry = env.run_json(&["submit", "fresh.example", "--watch", "--interval-ms", "25"]);
    assert_eq!(entry["status"], "COMPLETED");
    assert_eq!(entry["inputUrl"], "fresh.example");
    assert_eq!(entry["reportToken"], "tok-json-1234");
}

#[test]
fn watch_polls_until_every_run_settles() {
    let env = TestEnv::new();
    env.stub.script_run(
        ScriptedRun::new(1, "done.example")
            .statuses(&["COMPLETED"])
            .created_at("2025-08-20T08:00:00Z"),
    );
    env.stub.script_run(
        ScriptedRun::new(2, "busy.example")
            .statuses(&["RUNNING", "COMPLETED"])
            .created_at("2025-08-21T08:00:00Z"),
    );

    env.cmd()
        .args(["watch", "--interval-ms", "25"])
        .assert()
        .success()
        .stdout(contains("polling every 25 ms"))
        .stdout(contains("all runs settled:"));

    // The terminal run was never polled; the pending one stopped at its
    // terminal status.
    assert_eq!(env.stub.polls_for(1), 0);
    assert_eq!(env.stub.polls_for(2), 2);
}

#[test]
fn watch_with_nothing_pending_exits_without_polling() {
    let env = TestEnv::new();
    env.stub
        .script_run(ScriptedRun::new(1, "done.example").statuses(&["FAILED"]));

    env.cmd()
        .args(["watch", "--interval-ms", "25"])
        .assert()
        .success()
        .stdout(contains("nothing pending."));
    assert_eq!(env.stub.hits("status"), 0);
}

#[test]
fn watch_recovers_from_transient_poll_failures() {
    let env = TestEnv::new();
    env.stub.script_run(
        ScriptedRun::new(1, "flaky.example")
            .statuses(&["RUNNING", "COMPLETED"])
            .fail_first_polls(2),
    );

    env.cmd()
        .args(["watch", "--interval-ms", "25"])
        .assert()
        .success()
        .stdout(contains("all runs settled:"))
        .stdout(contains("[completed]"));
    // Two failed polls, then the two scripted statuses.
    assert_eq!(env.stub.polls_for(1), 4);
}

#[test]
fn watch_json_emits_the_final_list() {
    let env = TestEnv::new();
    env.stub.script_run(
        ScriptedRun::new(1, "busy.example")
            .statuses(&["RUNNING", "COMPLETED"])
            .report_token("tok-w-12345"),
    );

    let items = env.run_json(&["watch", "--interval-ms", "25"]);
    let items = items.as_array().expect("array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["status"], "COMPLETED");
    assert_eq!(items[0]["reportToken"], "tok-w-12345");
}
