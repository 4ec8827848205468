//! Parallel task dispatcher
//!
//! Every task gets its own OS thread. All workers are spawned before the first join and the
//! dispatcher returns only after every worker has finished. Each worker holds the only mutable
//! reference to its task, so results are written in place and come back in submission order.

use crate::config::TransferSettings;
use crate::progress;
use crate::task::{self, Status, Task};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed spawning worker for task {index}")]
    Spawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("worker for task {index} panicked: {message}")]
    Panic { index: usize, message: String },
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Applies `work` to every task on its own thread and waits for all of them.
///
/// The result for each task is `Ok` when its worker ran to completion. A worker that could not be
/// spawned or that panicked yields an error for that task only.
pub fn dispatch<T, F>(tasks: &mut [T], work: F) -> Vec<Result<(), DispatchError>>
where
    T: Send,
    F: Fn(&mut T) + Sync,
{
    let work = &work;
    std::thread::scope(|scope| {
        let handles: Vec<_> = tasks
            .iter_mut()
            .enumerate()
            .map(|(index, task)| {
                std::thread::Builder::new()
                    .name(format!("task-{index}"))
                    .spawn_scoped(scope, move || work(task))
                    .map_err(|source| DispatchError::Spawn { index, source })
            })
            .collect();
        tracing::debug!("spawned {} workers", handles.len());
        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| -> Result<(), DispatchError> {
                handle?.join().map_err(|payload| DispatchError::Panic {
                    index,
                    message: panic_message(payload.as_ref()),
                })
            })
            .collect()
    })
}

/// Runs every task concurrently, leaving measurements and statuses in the tasks.
///
/// Per-task failures, including workers that panicked or could not start, end up as
/// [`Status::Failed`] on the affected task; siblings are unaffected.
pub fn run_tasks(
    prog_track: &progress::Progress,
    tasks: &mut [Task],
    settings: &TransferSettings,
) {
    let results = dispatch(tasks, |each| task::execute(prog_track, each, settings));
    for (task, result) in tasks.iter_mut().zip(results) {
        if let Err(error) = result {
            tracing::error!("{}: {:#}", task.name(), &error);
            prog_track.files_failed.inc();
            task.status = Status::Failed(error.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Strategy;
    use crate::testutils::{small_settings, write_source};
    use std::time::{Duration, Instant};
    use tracing_test::traced_test;

    #[test]
    fn delayed_tasks_overlap() {
        let mut delays: Vec<u64> = vec![300, 200, 100, 300, 250];
        let start = Instant::now();
        let results = dispatch(&mut delays, |delay| {
            std::thread::sleep(Duration::from_millis(*delay));
        });
        let elapsed = start.elapsed();
        assert!(results.iter().all(Result::is_ok));
        // sequential execution would take 1150ms
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(1100), "{elapsed:?}");
    }

    #[test]
    fn results_stay_in_submission_order() {
        let mut slots: Vec<(u64, Option<std::thread::ThreadId>, String)> =
            (0..8).map(|idx| (idx, None, String::new())).collect();
        dispatch(&mut slots, |slot| {
            // later tasks finish first
            std::thread::sleep(Duration::from_millis(10 * (8 - slot.0)));
            slot.1 = Some(std::thread::current().id());
            slot.2 = std::thread::current().name().unwrap_or_default().to_string();
        });
        for (idx, (value, thread, name)) in slots.iter().enumerate() {
            assert_eq!(*value, idx as u64);
            assert!(thread.is_some());
            assert_eq!(name, &format!("task-{idx}"));
        }
        let distinct: std::collections::HashSet<_> = slots.iter().map(|slot| slot.1).collect();
        assert_eq!(distinct.len(), slots.len());
    }

    #[test]
    fn panic_is_isolated() {
        let mut values = vec![1, 2, 3, 4];
        let results = dispatch(&mut values, |value| {
            if *value == 3 {
                panic!("boom on {value}");
            }
            *value *= 10;
        });
        assert_eq!(values, vec![10, 20, 3, 40]);
        assert!(results[0].is_ok());
        match &results[2] {
            Err(DispatchError::Panic { index, message }) => {
                assert_eq!(*index, 2);
                assert_eq!(message, "boom on 3");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(results[3].is_ok());
    }

    #[test]
    fn empty_batch() {
        let mut nothing: Vec<u8> = Vec::new();
        assert!(dispatch(&mut nothing, |_| {}).is_empty());
    }

    #[test]
    #[traced_test]
    fn failing_task_does_not_affect_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let dst_dir = dir.path().join("dst");
        std::fs::create_dir(&dst_dir).unwrap();
        let mib = 1024 * 1024;
        let mut tasks = Vec::new();
        let mut expected = Vec::new();
        for (idx, size) in [mib, 2 * mib, 3 * mib].into_iter().enumerate() {
            let src = dir.path().join(format!("file{idx}"));
            expected.push(write_source(&src, size));
            tasks.push(Task::transfer(
                src,
                Some(dst_dir.join(format!("file{idx}"))),
                Strategy::DirectIo,
            ));
        }
        tasks.insert(
            1,
            Task::transfer(
                dir.path().join("missing"),
                Some(dst_dir.join("missing")),
                Strategy::DirectIo,
            ),
        );
        let prog_track = progress::Progress::new();
        run_tasks(&prog_track, &mut tasks, &small_settings());
        assert!(matches!(tasks[1].status, Status::Failed(_)));
        let copied: Vec<&Task> = tasks.iter().filter(|task| task.status.is_success()).collect();
        assert_eq!(copied.len(), 3);
        for (task, data) in copied.iter().zip(&expected) {
            let dst = task.destination.as_ref().unwrap();
            assert_eq!(&std::fs::read(dst).unwrap(), data);
        }
        let summary = crate::task::CopySummary::from_tasks(&tasks);
        assert_eq!(summary.total_size_mib, 6.0);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(prog_track.files_failed.get(), 1);
        assert_eq!(prog_track.files_transferred.get(), 3);
        assert_eq!((prog_track.ops.pending(), prog_track.ops.finished()), (0, 4));
    }
}
