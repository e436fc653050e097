//! Dedicated pipeline thread.
//!
//! A [`PipelineWorker`] owns a thread that runs submitted modules through a
//! pipeline in submission order. Each submission returns a
//! [`PipelineTicket`]; waiting on it blocks on the result channel until the
//! worker answers.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use shaderweave_core::PassError;

use crate::module::IrModule;
use crate::passes::{PassPipeline, PipelineDescriptor, PipelineResult};
use crate::reflection::ShaderReflection;

struct Job {
    module: IrModule,
    reflection: ShaderReflection,
    descriptor: PipelineDescriptor,
    reply: Sender<Result<PipelineResult, PassError>>,
}

/// Handle to a pending pipeline run.
#[derive(Debug)]
pub struct PipelineTicket {
    receiver: Receiver<Result<PipelineResult, PassError>>,
}

impl PipelineTicket {
    /// Block until the run completes.
    pub fn wait(self) -> Result<PipelineResult, PassError> {
        self.receiver
            .recv()
            .unwrap_or(Err(PassError::WorkerDisconnected))
    }

    /// The result if the run has already completed.
    pub fn try_take(&self) -> Option<Result<PipelineResult, PassError>> {
        self.receiver.try_recv().ok()
    }
}

/// A thread that runs pipelines.
#[derive(Debug)]
pub struct PipelineWorker {
    sender: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl PipelineWorker {
    /// Spawn the worker thread.
    pub fn spawn() -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("shaderweave-pipeline".into())
            .spawn(move || {
                for job in receiver {
                    let result = PassPipeline::new(job.descriptor).run(&job.module, job.reflection);
                    if job.reply.send(result).is_err() {
                        log::debug!("pipeline result dropped; ticket was discarded");
                    }
                }
            })?;
        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Queue a module. The returned ticket yields the result.
    pub fn submit(
        &self,
        module: IrModule,
        reflection: ShaderReflection,
        descriptor: PipelineDescriptor,
    ) -> PipelineTicket {
        let (reply, receiver) = mpsc::channel();
        let job = Job {
            module,
            reflection,
            descriptor,
            reply,
        };
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                log::warn!("pipeline worker has stopped");
            }
        }
        PipelineTicket { receiver }
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("pipeline worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::test_module::pixel_module;
    use crate::reflection::reflect_module;

    #[test]
    fn submitted_modules_complete_in_order() {
        let worker = PipelineWorker::spawn().unwrap();
        let module = pixel_module();
        let tickets: Vec<_> = (0..3)
            .map(|_| {
                worker.submit(
                    module.clone(),
                    reflect_module(&module),
                    PipelineDescriptor::default(),
                )
            })
            .collect();
        let expected = PassPipeline::default()
            .run(&module, reflect_module(&module))
            .unwrap();
        for ticket in tickets {
            assert_eq!(ticket.wait().unwrap(), expected);
        }
    }

    #[test]
    fn discarded_ticket_does_not_stop_worker() {
        let worker = PipelineWorker::spawn().unwrap();
        let module = pixel_module();
        drop(worker.submit(module.clone(), reflect_module(&module), PipelineDescriptor::default()));
        let ticket = worker.submit(module.clone(), reflect_module(&module), PipelineDescriptor::default());
        assert!(ticket.wait().is_ok());
    }
}
