//! Command queue and completion tokens
//!
//! A queue is an ordered submission channel: one worker thread drains an
//! operation channel FIFO, so operations submitted to the same queue
//! execute in submission order at queue-operation granularity. Element
//! tasks inside a single dispatch carry no ordering of their own.
//!
//! Submission returns a `CompletionToken`; there is no implicit ordering
//! between submission and completion. A failure after submission lands in
//! the context's fault sink and surfaces at the next `wait`. No timeout
//! and no cancellation: a hung operation blocks `wait` indefinitely.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use bytemuck::Pod;

use crate::backend::{BufferHandle, ElementRecord, Kernel};
use crate::error::{Result, UsmError};
use crate::memory::{DeviceBuffer, HostBuffer};
use crate::runtime::context::ExecutionContext;
use crate::runtime::fault::Fault;

enum QueueOp {
    Copy {
        handle: BufferHandle,
        bytes: Vec<u8>,
        done: Sender<()>,
    },
    Dispatch {
        handle: BufferHandle,
        n: usize,
        kernel: Kernel,
        done: Sender<()>,
    },
}

impl QueueOp {
    fn name(&self) -> &'static str {
        match self {
            QueueOp::Copy { .. } => "copy-host-to-device",
            QueueOp::Dispatch {
                kernel: Kernel::ReadOut(_),
                ..
            } => "verification-dispatch",
            QueueOp::Dispatch {
                kernel: Kernel::Increment,
                ..
            } => "mutation-dispatch",
        }
    }
}

/// Future completion of one submitted operation.
///
/// `wait` blocks the coordinating thread until the queue reports the
/// operation finished, then drains the fault sink so post-submission
/// failures become hard errors instead of disappearing.
pub struct CompletionToken {
    op: &'static str,
    done: Receiver<()>,
    context: ExecutionContext,
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken").field("op", &self.op).finish()
    }
}

impl CompletionToken {
    /// Block until completion, then surface any queued fault.
    pub fn wait(self) -> Result<()> {
        if self.done.recv().is_err() {
            return Err(UsmError::AsyncTransfer {
                op: self.op.to_string(),
                reason: "queue worker terminated before completion".to_string(),
            });
        }
        self.context.fault_sink().check()
    }
}

/// Ordered submission channel for asynchronous operations on one device.
pub struct Queue {
    context: ExecutionContext,
    ops: Option<Sender<QueueOp>>,
    worker: Option<JoinHandle<()>>,
}

impl Queue {
    /// Start the queue worker for `context`.
    pub(crate) fn spawn(context: ExecutionContext) -> Result<Queue> {
        let (tx, rx) = mpsc::channel::<QueueOp>();
        let worker_context = context.clone();
        let worker = std::thread::Builder::new()
            .name("usm-probe-queue".to_string())
            .spawn(move || {
                for op in rx {
                    let name = op.name();
                    let (result, done) = match op {
                        QueueOp::Copy {
                            handle,
                            bytes,
                            done,
                        } => (worker_context.backend().write(handle, &bytes), done),
                        QueueOp::Dispatch {
                            handle,
                            n,
                            kernel,
                            done,
                        } => (worker_context.backend().dispatch(handle, n, kernel), done),
                    };
                    if let Err(e) = result {
                        worker_context.fault_sink().push(Fault {
                            op: name.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    // Completion is signalled after the fault is recorded
                    // so a wait on this token observes it.
                    let _ = done.send(());
                }
            })
            .map_err(|e| UsmError::ContextCreation {
                device: context.device_name().to_string(),
                reason: format!("failed to start queue worker: {e}"),
            })?;

        Ok(Queue {
            context,
            ops: Some(tx),
            worker: Some(worker),
        })
    }

    /// The context this queue submits into.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Submit a one-shot asynchronous copy of `host` into `device`.
    ///
    /// The caller must `wait` on the returned token before any kernel
    /// reads the device buffer.
    pub fn copy_host_to_device<T: Pod>(
        &self,
        host: &HostBuffer<T>,
        device: &DeviceBuffer<T>,
    ) -> Result<CompletionToken> {
        self.check_binding(device)?;
        if host.len() != device.len() {
            return Err(UsmError::TransferSizeMismatch {
                host: host.len(),
                device: device.len(),
            });
        }
        let bytes = bytemuck::cast_slice(host.as_slice()).to_vec();
        let (done_tx, done_rx) = mpsc::channel();
        self.submit(QueueOp::Copy {
            handle: device.handle(),
            bytes,
            done: done_tx,
        })?;
        Ok(self.token("copy-host-to-device", done_rx))
    }

    /// Enqueue one verification task per element of `device`.
    ///
    /// Each task reads its element and emits an `ElementRecord` on the
    /// returned receiver; records arrive in no defined order. Collect them
    /// only after the token's `wait` succeeds.
    pub fn launch_verification(
        &self,
        device: &DeviceBuffer<u32>,
    ) -> Result<(CompletionToken, Receiver<ElementRecord>)> {
        self.check_binding(device)?;
        let (record_tx, record_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        self.submit(QueueOp::Dispatch {
            handle: device.handle(),
            n: device.len(),
            kernel: Kernel::ReadOut(record_tx),
            done: done_tx,
        })?;
        Ok((self.token("verification-dispatch", done_rx), record_rx))
    }

    /// Enqueue one increment task per element of `device`.
    ///
    /// A `wait` on the returned token is required before any readback is
    /// trusted.
    pub fn launch_mutation(&self, device: &DeviceBuffer<u32>) -> Result<CompletionToken> {
        self.check_binding(device)?;
        let (done_tx, done_rx) = mpsc::channel();
        self.submit(QueueOp::Dispatch {
            handle: device.handle(),
            n: device.len(),
            kernel: Kernel::Increment,
            done: done_tx,
        })?;
        Ok(self.token("mutation-dispatch", done_rx))
    }

    fn check_binding<T: Pod>(&self, device: &DeviceBuffer<T>) -> Result<()> {
        if self.context.same_context(device.context()) {
            Ok(())
        } else {
            Err(UsmError::KernelLaunch {
                reason: "buffer belongs to a different execution context".to_string(),
            })
        }
    }

    fn submit(&self, op: QueueOp) -> Result<()> {
        let name = op.name();
        let sender = self.ops.as_ref().ok_or_else(|| UsmError::AsyncTransfer {
            op: name.to_string(),
            reason: "queue is shutting down".to_string(),
        })?;
        sender.send(op).map_err(|_| UsmError::AsyncTransfer {
            op: name.to_string(),
            reason: "queue worker terminated".to_string(),
        })
    }

    fn token(&self, op: &'static str, done: Receiver<()>) -> CompletionToken {
        CompletionToken {
            op,
            done,
            context: self.context.clone(),
        }
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop; join so no queued
        // operation outlives the queue.
        drop(self.ops.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
