use assert_cmd::Command;
use stub_api::StubApi;
use tokio::runtime::Runtime;

/// One stub backend per test, plus a command factory wired to it. The
/// runtime is held so the stub keeps serving while the console binary
/// runs synchronously.
pub struct TestEnv {
    pub stub: StubApi,
    _rt: Runtime,
}

impl TestEnv {
    pub fn new() -> Self {
        let rt = Runtime::new().expect("tokio runtime");
        let stub = rt.block_on(StubApi::start());
        TestEnv { stub, _rt: rt }
    }

    /// Console command pre-wired to the stub via --api-base, with the
    /// environment override cleared.
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("audit-console").expect("audit-console binary");
        cmd.env_remove("AUDIT_CONSOLE_API_BASE");
        cmd.arg("--api-base").arg(self.stub.base_url());
        cmd
    }

    /// Bare command with no backend wiring, for exercising the address
    /// resolution paths.
    pub fn bare_cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("audit-console").expect("audit-console binary");
        cmd.env_remove("AUDIT_CONSOLE_API_BASE");
        cmd
    }

    /// Run a subcommand with --json and parse stdout.
    pub fn run_json(&self, args: &[&str]) -> serde_json::Value {
        let assert = self.cmd().arg("--json").args(args).assert().success();
        serde_json::from_slice(&assert.get_output().stdout).expect("json output")
    }
}
