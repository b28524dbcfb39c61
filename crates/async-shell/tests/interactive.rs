//! Tests for interactive stdin and non-blocking status checks

#![cfg(unix)]

mod common;

use async_shell::{CommandSpec, Runner};
use common::{sh, TestSpawner};
use futures::StreamExt;
use std::time::Duration;

#[test]
fn test_interactive_stdin_round_trip() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::builder("cat").interactive_stdin().build()?;
        let mut execution = Runner::new().start(&spec)?;
        let mut stdin = execution.stdin().expect("interactive stdin");
        assert!(execution.stdin().is_none());

        stdin.write_line("one").await?;
        let echoed = execution.next().await.expect("echoed line");
        assert_eq!(echoed.data, b"one\n");

        stdin.write(b"two\n").await?;
        stdin.close().await?;

        let result = execution.finish().await?;
        assert!(result.success());
        assert_eq!(result.stdout, b"one\ntwo\n");
        Ok(())
    })
}

#[test]
fn test_untaken_stdin_is_closed_by_finish() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::builder("cat")
            .interactive_stdin()
            .timeout(Duration::from_secs(5))
            .build()?;
        let result = Runner::new().run(&spec).await?;
        assert!(result.success());
        assert!(result.stdout.is_empty());
        Ok(())
    })
}

#[test]
fn test_no_stdin_handle_without_interactive_spec() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::builder("cat").input("data").build()?;
        let mut execution = Runner::new().start(&spec)?;
        assert!(execution.stdin().is_none());
        assert_eq!(execution.finish().await?.stdout, b"data");
        Ok(())
    })
}

#[test]
fn test_try_status_reports_exit_without_waiting() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let mut execution = Runner::new().start(&sh("exit 7")?)?;

        let status = loop {
            if let Some(status) = execution.try_status()? {
                break status;
            }
            smol::Timer::after(Duration::from_millis(10)).await;
        };
        assert_eq!(status.code, Some(7));

        let result = execution.finish().await?;
        assert_eq!(result.exit_code(), Some(7));
        Ok(())
    })
}

#[test]
fn test_try_status_while_running() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::builder("sleep").arg("10").build()?;
        let mut execution = Runner::new().start(&spec)?;
        assert_eq!(execution.try_status()?, None);
        Ok(())
    })
}

#[smol_potat::test]
async fn test_background_interactive_stdin() {
    let spec = CommandSpec::builder("cat").interactive_stdin().build().unwrap();
    let mut run = Runner::new().spawn(&spec, &TestSpawner).unwrap();
    let mut stdin = run.stdin().unwrap();

    stdin.write_line("ping").await.unwrap();
    let chunk = run.chunks().recv().await.unwrap();
    assert_eq!(chunk.text(), "ping");

    stdin.close().await.unwrap();
    let result = run.outcome().await.unwrap();
    assert_eq!(result.stdout, b"ping\n");
}
