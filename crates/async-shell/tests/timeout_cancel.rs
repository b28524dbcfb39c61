//! Tests for timeouts, cancellation and process cleanup

#![cfg(unix)]

mod common;

use async_shell::{CancelToken, CommandSpec, Error, Runner};
use common::{is_alive, sh};
use futures::StreamExt;
use nix::sys::signal::Signal;
use std::time::{Duration, Instant};

#[test]
fn test_timeout_terminates_and_reaps() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let runner = Runner::new();
        let spec = CommandSpec::builder("sleep")
            .arg("10")
            .timeout(Duration::from_millis(300))
            .build()?;

        let started = Instant::now();
        let execution = runner.start(&spec)?;
        let pid = execution.pid();
        let err = execution.finish().await.unwrap_err();
        let elapsed = started.elapsed();

        match &err {
            Error::TimedOut {
                timeout, partial, ..
            } => {
                assert_eq!(*timeout, Duration::from_millis(300));
                assert!(partial.terminated);
                assert_eq!(partial.status.signal, Some(Signal::SIGTERM as i32));
            }
            other => panic!("expected TimedOut, got {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(300));
        let bound = Duration::from_millis(300) + runner.grace_period() + Duration::from_secs(1);
        assert!(elapsed < bound, "took {elapsed:?}");
        assert!(!is_alive(pid), "Process {pid} should be reaped");
        Ok(())
    })
}

#[test]
fn test_timeout_keeps_partial_output() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::shell("echo started; echo warming >&2; exec sleep 10")
            .timeout(Duration::from_millis(500))
            .build()?;

        let err = Runner::new().run(&spec).await.unwrap_err();
        assert!(err.is_timeout());

        let partial = err.partial_result().unwrap();
        assert_eq!(partial.stdout, b"started\n");
        assert_eq!(partial.stderr, b"warming\n");
        Ok(())
    })
}

#[test]
fn test_timeout_escalates_to_kill() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let runner = Runner::new().with_grace_period(Duration::from_millis(200));
        let spec = CommandSpec::shell("trap '' TERM; while true; do sleep 0.1; done")
            .timeout(Duration::from_millis(300))
            .build()?;

        let execution = runner.start(&spec)?;
        let pid = execution.pid();
        let err = execution.finish().await.unwrap_err();

        let partial = err.partial_result().unwrap();
        assert_eq!(partial.status.signal, Some(Signal::SIGKILL as i32));
        assert!(!is_alive(pid));
        Ok(())
    })
}

#[test]
fn test_fast_command_beats_timeout() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::builder("echo")
            .arg("quick")
            .timeout(Duration::from_secs(5))
            .build()?;

        let started = Instant::now();
        let result = Runner::new().run(&spec).await?;
        assert_eq!(result.stdout, b"quick\n");
        assert!(!result.terminated);
        assert!(started.elapsed() < Duration::from_secs(5));
        Ok(())
    })
}

#[test]
fn test_timeout_applies_after_pipes_close() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        // Closes both output pipes, then keeps running
        let spec = CommandSpec::shell("exec >&- 2>&-; exec sleep 10")
            .timeout(Duration::from_millis(300))
            .build()?;

        let started = Instant::now();
        let err = Runner::new().run(&spec).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(5));
        Ok(())
    })
}

#[test]
fn test_finish_after_deadline_reports_natural_exit() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::builder("echo")
            .arg("hi")
            .timeout(Duration::from_millis(300))
            .build()?;
        let execution = Runner::new().start(&spec)?;

        // The process exited long before the deadline; collect it late
        smol::Timer::after(Duration::from_millis(600)).await;
        let result = execution.finish().await?;

        assert_eq!(result.exit_code(), Some(0));
        assert!(!result.terminated);
        assert_eq!(result.stdout, b"hi\n");
        Ok(())
    })
}

#[test]
fn test_slow_consumer_after_deadline_gets_all_output() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::shell("echo one; echo two")
            .timeout(Duration::from_millis(300))
            .check(true)
            .build()?;
        let mut execution = Runner::new().start(&spec)?;

        let first = execution.next().await.expect("first chunk");
        assert_eq!(first.text(), "one");
        smol::Timer::after(Duration::from_millis(600)).await;

        let second = execution.next().await.expect("second chunk");
        assert_eq!(second.text(), "two");
        let result = execution.finish().await?;
        assert_eq!(result.stdout, b"one\ntwo\n");
        assert!(!result.terminated);
        Ok(())
    })
}

#[test]
fn test_exited_process_with_held_output_is_not_a_timeout() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let runner = Runner::new().with_drain_timeout(Duration::from_millis(200));
        // The shell exits at once; its background child keeps stdout open
        let spec = CommandSpec::shell("sleep 3 & echo done")
            .timeout(Duration::from_millis(300))
            .build()?;

        let started = Instant::now();
        let result = runner.run(&spec).await?;

        assert_eq!(result.exit_code(), Some(0));
        assert!(!result.terminated);
        assert_eq!(result.stdout, b"done\n");
        assert!(started.elapsed() < Duration::from_secs(2));
        Ok(())
    })
}

#[test]
fn test_drain_after_timeout_is_bounded() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let timeout = Duration::from_millis(200);
        let runner = Runner::new().with_drain_timeout(Duration::from_millis(300));
        // The background sleep survives the shell and holds both pipes
        let spec = CommandSpec::shell("sleep 5 & sleep 5")
            .timeout(timeout)
            .build()?;

        let started = Instant::now();
        let err = runner.run(&spec).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(err.is_timeout(), "expected TimedOut, got {err:?}");
        assert!(err.partial_result().unwrap().terminated);
        assert!(elapsed >= timeout + runner.drain_timeout(), "took {elapsed:?}");
        let bound = timeout + runner.grace_period() + runner.drain_timeout();
        assert!(elapsed < bound + Duration::from_millis(500), "took {elapsed:?}");
        Ok(())
    })
}

#[test]
fn test_cancel_within_ten_millis() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let token = CancelToken::new();
        let spec = CommandSpec::builder("sleep").arg("10").build()?;

        let started = Instant::now();
        let execution = Runner::new().start(&spec)?.cancel_on(&token);
        let pid = execution.pid();

        let canceller = token.clone();
        let (result, ()) = futures::join!(execution.finish(), async move {
            smol::Timer::after(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = result.unwrap_err();
        assert!(err.is_cancelled(), "expected Cancelled, got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!is_alive(pid), "Process {pid} should be reaped");
        Ok(())
    })
}

#[test]
fn test_run_cancellable() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let token = CancelToken::new();
        let spec = sh("sleep 10")?;
        let runner = Runner::new();

        let canceller = token.clone();
        let (result, ()) = futures::join!(runner.run_cancellable(&spec, &token), async move {
            smol::Timer::after(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        assert!(matches!(result, Err(Error::Cancelled { .. })));
        Ok(())
    })
}

#[test]
fn test_uncancelled_token_runs_normally() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let token = CancelToken::new();
        let spec = CommandSpec::builder("echo").arg("fine").build()?;
        let result = Runner::new().run_cancellable(&spec, &token).await?;
        assert_eq!(result.stdout, b"fine\n");
        Ok(())
    })
}

#[test]
fn test_drop_kills_process() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let spec = CommandSpec::builder("sleep").arg("60").build()?;
        let execution = Runner::new().start(&spec)?;
        let pid = execution.pid();

        drop(execution);

        // Give the reaper a moment
        smol::Timer::after(Duration::from_millis(200)).await;
        assert!(!is_alive(pid), "Process should be killed when dropped");
        Ok(())
    })
}

#[test]
fn test_dropped_run_future_kills_process() -> anyhow::Result<()> {
    futures::executor::block_on(async {
        let marker = tempfile::NamedTempFile::new()?;
        let line = format!("echo $$ > {}; exec sleep 60", marker.path().display());
        let spec = sh(&line)?;
        let runner = Runner::new();

        // Abandon the run once the child has recorded its pid
        let abandoned = futures_lite::future::or(
            async {
                let _ = runner.run(&spec).await;
                false
            },
            async {
                smol::Timer::after(Duration::from_millis(300)).await;
                true
            },
        )
        .await;
        assert!(abandoned);

        let pid: u32 = std::fs::read_to_string(marker.path())?.trim().parse()?;
        smol::Timer::after(Duration::from_millis(200)).await;
        assert!(!is_alive(pid), "Process {pid} should be killed with its future");
        Ok(())
    })
}
