//! Resource limits and cancellation

use std::sync::Arc;
use std::time::Duration;
use workshell::{
    AbortHandle, Builtin, BuiltinContext, Error, ExecResult, ExecutionLimits, InMemoryFs,
    LimitExceeded, Shell, async_trait,
};

fn limited(limits: ExecutionLimits) -> Shell {
    Shell::builder().limits(limits).build()
}

#[tokio::test]
async fn test_loop_iteration_limit() {
    let mut shell = limited(ExecutionLimits::new().max_loop_iterations(100));
    let err = shell.exec("while true; do :; done").await.unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceLimit(LimitExceeded::MaxLoopIterations(100))
    ));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_command_limit() {
    let mut shell = limited(ExecutionLimits::new().max_commands(3));
    let err = shell
        .exec("for i in 1 2 3 4 5; do echo $i; done")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceLimit(LimitExceeded::MaxCommands(3))
    ));
}

#[tokio::test]
async fn test_command_budget_is_per_run() {
    let mut shell = limited(ExecutionLimits::new().max_commands(3));
    for _ in 0..3 {
        let result = shell.exec("echo a; echo b").await.unwrap();
        assert_eq!(result.stdout, "a\nb\n");
    }
}

#[tokio::test]
async fn test_substitution_nesting_limit() {
    let mut shell = limited(ExecutionLimits::new().max_nesting_depth(2));
    let result = shell.exec("echo $(echo $(echo ok))").await.unwrap();
    assert_eq!(result.stdout, "ok\n");

    let err = shell
        .exec("echo $(echo $(echo $(echo deep)))")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceLimit(LimitExceeded::MaxNestingDepth(2))
    ));
}

#[tokio::test]
async fn test_recursive_script_is_stopped() {
    let fs = InMemoryFs::new().with_file("/loop.sh", "echo level $1\nsh /loop.sh x$1\n");
    let shell = Shell::builder()
        .fs(Arc::new(fs))
        .limits(ExecutionLimits::new().max_nesting_depth(5))
        .build();
    let err = shell.run("sh /loop.sh").await.unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceLimit(LimitExceeded::MaxNestingDepth(5))
    ));
}

#[tokio::test]
async fn test_timeout() {
    let mut shell = limited(
        ExecutionLimits::new()
            .max_commands(usize::MAX)
            .max_loop_iterations(usize::MAX)
            .timeout(Duration::from_millis(50)),
    );
    let err = shell.exec("while true; do :; done").await.unwrap_err();
    assert!(matches!(err, Error::ResourceLimit(LimitExceeded::Timeout(_))));
}

#[tokio::test]
async fn test_limit_error_from_run() {
    let fs = InMemoryFs::new().with_file("/spin.sh", "while true; do :; done\n");
    let shell = Shell::builder()
        .fs(Arc::new(fs))
        .limits(ExecutionLimits::new().max_loop_iterations(10))
        .build();
    let err = shell.run("sh /spin.sh").await.unwrap_err();
    assert!(err.to_string().contains("maximum loop iterations exceeded"));
}

/// Aborts the run holding its handle
struct Stop {
    handle: AbortHandle,
}

#[async_trait]
impl Builtin for Stop {
    async fn execute(&self, _ctx: BuiltinContext<'_>) -> workshell::Result<ExecResult> {
        self.handle.abort();
        Ok(ExecResult::ok(""))
    }
}

fn abortable(files: InMemoryFs) -> (Shell, AbortHandle) {
    let handle = AbortHandle::new();
    let shell = Shell::builder()
        .fs(Arc::new(files))
        .builtin(
            "stop",
            Box::new(Stop {
                handle: handle.clone(),
            }),
        )
        .build();
    (shell, handle)
}

#[tokio::test]
async fn test_abort_stops_run_with_130() {
    let fs = InMemoryFs::new().with_file(
        "/job.sh",
        "echo before\nfor i in 1 2 3; do echo $i; stop; done\necho after\n",
    );
    let (shell, abort) = abortable(fs);
    let output = shell.run_with_abort("sh /job.sh", &abort).await.unwrap();
    assert_eq!(output.stdout, "before\n1\n");
    assert_eq!(output.code, 130);
}

#[tokio::test]
async fn test_abort_only_stops_its_own_run() {
    let fs = InMemoryFs::new()
        .with_file("/job.sh", "stop\necho unreachable\n")
        .with_file("/short.sh", "echo short\n");
    let (shell, abort) = abortable(fs);

    let first = shell.run_with_abort("sh /job.sh", &abort).await.unwrap();
    assert_eq!(first.code, 130);
    assert_eq!(first.stdout, "");

    // The handle stays aborted but other runs never see it
    assert!(abort.is_aborted());
    let second = shell.run("sh /short.sh").await.unwrap();
    assert_eq!(second.code, 0);
    assert_eq!(second.stdout, "short\n");

    let again = shell.run_with_abort("sh /short.sh", &abort).await.unwrap();
    assert_eq!(again.code, 130);
    assert_eq!(again.stdout, "");
}

#[tokio::test]
async fn test_abort_leaves_concurrent_run_alone() {
    let fs = InMemoryFs::new()
        .with_file("/job.sh", "echo a\nstop\necho b\n")
        .with_file("/count.sh", "for i in 1 2 3; do echo $i; done\n");
    let (shell, abort) = abortable(fs);
    let other = AbortHandle::new();

    let (stopped, finished) = tokio::join!(
        shell.run_with_abort("sh /job.sh", &abort),
        shell.run_with_abort("sh /count.sh", &other),
    );
    let stopped = stopped.unwrap();
    assert_eq!(stopped.stdout, "a\n");
    assert_eq!(stopped.code, 130);
    let finished = finished.unwrap();
    assert_eq!(finished.stdout, "1\n2\n3\n");
    assert_eq!(finished.code, 0);
}

#[tokio::test]
async fn test_abort_inside_nested_script() {
    let fs = InMemoryFs::new()
        .with_file("/outer.sh", "sh /inner.sh\necho outer after\n")
        .with_file("/inner.sh", "echo inner\nstop\necho inner after\n");
    let (shell, abort) = abortable(fs);
    let output = shell.run_with_abort("sh /outer.sh", &abort).await.unwrap();
    assert_eq!(output.stdout, "inner\n");
    assert_eq!(output.code, 130);
}

#[tokio::test]
async fn test_abort_in_session() {
    let (mut shell, abort) = abortable(InMemoryFs::new());
    let result = shell.exec_with_abort("echo a; stop; echo b", &abort).await.unwrap();
    assert_eq!(result.stdout, "a\n");
    assert_eq!(result.exit_code, 130);

    let result = shell.exec("echo again").await.unwrap();
    assert_eq!(result.stdout, "again\n");
}
