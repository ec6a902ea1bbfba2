//! Runs updates on a dedicated thread. The simulation state is moved to the
//! worker when an update begins and moved back when it is collected, so the
//! two threads never touch it at the same time
//!

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use super::state::SimState;
use crate::prelude::*;
use bevy::prelude::*;
use parking_lot::Mutex;

/// State handed back by the worker with the outcome of the update
type UpdateOutcome = (Box<SimState>, Result<(), QtpfsError>);

/// Owner of the update thread
pub(crate) struct BackgroundWorker {
	/// Hands state to the worker, dropped to stop it
	job_sender: Option<Sender<Box<SimState>>>,
	/// Receives finished updates, locked so the manager stays `Sync`
	done_receiver: Mutex<Receiver<UpdateOutcome>>,
	/// The thread
	handle: Option<JoinHandle<()>>,
	/// An update has been dispatched and not yet collected
	in_flight: bool,
}

impl BackgroundWorker {
	/// Start the thread
	pub(crate) fn spawn() -> Result<Self, QtpfsError> {
		let (job_sender, job_receiver) = mpsc::channel::<Box<SimState>>();
		let (done_sender, done_receiver) = mpsc::channel::<UpdateOutcome>();
		let handle = std::thread::Builder::new()
			.name("qtpfs-update".to_string())
			.spawn(move || {
				while let Ok(mut state) = job_receiver.recv() {
					let result = state.run_update();
					if done_sender.send((state, result)).is_err() {
						break;
					}
				}
				debug!("Pathfinding update worker stopped");
			})
			.map_err(QtpfsError::WorkerSpawn)?;
		Ok(BackgroundWorker {
			job_sender: Some(job_sender),
			done_receiver: Mutex::new(done_receiver),
			handle: Some(handle),
			in_flight: false,
		})
	}
	/// True while an update is running or waiting to be collected
	pub(crate) fn is_in_flight(&self) -> bool {
		self.in_flight
	}
	/// Move `state` to the worker and start an update on it
	pub(crate) fn dispatch(&mut self, state: Box<SimState>) -> Result<(), QtpfsError> {
		let sender = self.job_sender.as_ref().ok_or(QtpfsError::WorkerDisconnected)?;
		sender.send(state).map_err(|_| QtpfsError::WorkerDisconnected)?;
		self.in_flight = true;
		Ok(())
	}
	/// Block until the dispatched update finishes and take the state back
	pub(crate) fn collect(&mut self) -> Result<UpdateOutcome, QtpfsError> {
		let outcome = self
			.done_receiver
			.lock()
			.recv()
			.map_err(|_| QtpfsError::WorkerDisconnected)?;
		self.in_flight = false;
		Ok(outcome)
	}
}

impl Drop for BackgroundWorker {
	fn drop(&mut self) {
		drop(self.job_sender.take());
		if let Some(handle) = self.handle.take() {
			if handle.join().is_err() {
				error!("Pathfinding update worker panicked");
			}
		}
	}
}
