//! Hand-off of operation calls from request threads to the host's main tick.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::http::StatusCode;
use bevy::prelude::World;
use crossbeam_channel::{Receiver, Sender};

use crate::logging::{LogLevel, ServerLog};
use crate::registry::{Args, OperationDescriptor};
use crate::response::{HttpReply, ResponseHandle};

/// One operation call waiting for the main tick.
pub struct PendingInvocation {
    pub operation: Arc<OperationDescriptor>,
    pub args: Args,
    pub response: ResponseHandle,
}

/// Producer half. Cloned into every request handler.
#[derive(Clone)]
pub struct InvocationQueue {
    sender: Sender<PendingInvocation>,
}

impl InvocationQueue {
    /// Never blocks. Hands the invocation back if the executor is gone.
    pub fn enqueue(&self, invocation: PendingInvocation) -> Result<(), PendingInvocation> {
        self.sender.send(invocation).map_err(|e| e.into_inner())
    }
}

/// Consumer half. Only the thread that owns the host `World` drains it.
pub struct MainThreadExecutor {
    receiver: Receiver<PendingInvocation>,
    log: ServerLog,
}

pub fn invocation_channel(log: ServerLog) -> (InvocationQueue, MainThreadExecutor) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (
        InvocationQueue { sender },
        MainThreadExecutor { receiver, log },
    )
}

impl MainThreadExecutor {
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Runs everything queued at the moment of the call, in FIFO order.
    ///
    /// Invocations enqueued while draining (including by a running operation)
    /// wait for the next tick. Every dequeued response is finalized exactly
    /// once, whether the operation returns, fails or panics.
    pub fn drain_and_run_all(&self, world: &mut World) -> usize {
        let batch = self.receiver.len();
        let mut ran = 0;
        for _ in 0..batch {
            let Ok(invocation) = self.receiver.try_recv() else {
                break;
            };
            self.run(world, invocation);
            ran += 1;
        }
        ran
    }

    /// Finalizes every queued invocation with 503 without running it.
    pub fn discard_pending(&self) -> usize {
        let mut discarded = 0;
        while let Ok(mut invocation) = self.receiver.try_recv() {
            invocation.response.send(HttpReply::error(
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down.",
            ));
            discarded += 1;
        }
        if discarded > 0 {
            self.log.log_message(
                format!("Discarded {discarded} pending command(s) during shutdown"),
                LogLevel::Raised,
            );
        }
        discarded
    }

    fn run(&self, world: &mut World, invocation: PendingInvocation) {
        let PendingInvocation {
            operation,
            args,
            mut response,
        } = invocation;
        self.log.log_message(
            format!("Running {} on main tick", operation.path),
            LogLevel::Verbose,
        );

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (operation.handler)(world, &mut response, &args)
        }));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.0),
            Err(payload) => Some(format!("operation panicked: {}", panic_message(&*payload))),
        };

        match failure {
            None => response.close(),
            Some(message) => {
                self.log
                    .error(format!("Command {} failed: {message}", operation.path));
                if response.is_finalized() {
                    self.log.log_message(
                        format!(
                            "Response for {} was already sent before the failure",
                            operation.path
                        ),
                        LogLevel::Raised,
                    );
                } else {
                    response.send(HttpReply::error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Server error. {message}"),
                    ));
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
