use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::state::{ActiveScene, RotationState, SceneRotation};
use crate::clock::Clock;
use crate::models::Scene;

/// How often active windows are re-evaluated when nothing else happens.
pub const ELIGIBILITY_RECHECK: Duration = Duration::from_secs(60);

#[derive(Debug)]
enum Command {
    ReplaceScenes(Vec<Scene>),
    Next,
    JumpTo(usize),
    JumpToScene(i64),
}

/// Cloneable command side of a [`RotationController`].
#[derive(Debug, Clone)]
pub struct RotationHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RotationHandle {
    /// Replace the scene list wholesale (e.g. after a successful sync).
    pub fn replace_scenes(&self, scenes: Vec<Scene>) {
        self.send(Command::ReplaceScenes(scenes));
    }

    pub fn next(&self) {
        self.send(Command::Next);
    }

    /// Jump to the eligible scene at `index`; out-of-range indices are ignored.
    pub fn jump_to(&self, index: usize) {
        self.send(Command::JumpTo(index));
    }

    pub fn jump_to_scene(&self, scene_id: i64) {
        self.send(Command::JumpToScene(scene_id));
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Rotation task already stopped, command dropped");
        }
    }
}

/// Drives a [`SceneRotation`] from a background task.
///
/// The task owns one timer. Each transition re-arms it for the new scene's
/// deadline; there is never more than one pending. Renderers follow the
/// current scene through [`subscribe`](Self::subscribe).
pub struct RotationController {
    handle: RotationHandle,
    frames: watch::Receiver<Option<ActiveScene>>,
    task: JoinHandle<()>,
}

impl RotationController {
    /// Start the rotation task. Must be called inside a Tokio runtime.
    pub fn spawn(clock: Arc<dyn Clock>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (frame_sender, frames) = watch::channel(None);
        let task = tokio::spawn(run(clock, receiver, frame_sender));

        Self {
            handle: RotationHandle { commands },
            frames,
            task,
        }
    }

    pub fn handle(&self) -> RotationHandle {
        self.handle.clone()
    }

    pub fn replace_scenes(&self, scenes: Vec<Scene>) {
        self.handle.replace_scenes(scenes);
    }

    pub fn next(&self) {
        self.handle.next();
    }

    pub fn jump_to(&self, index: usize) {
        self.handle.jump_to(index);
    }

    pub fn jump_to_scene(&self, scene_id: i64) {
        self.handle.jump_to_scene(scene_id);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ActiveScene>> {
        self.frames.clone()
    }

    pub fn current(&self) -> Option<ActiveScene> {
        self.frames.borrow().clone()
    }

    pub fn state(&self) -> RotationState {
        match self.frames.borrow().as_ref() {
            Some(active) => RotationState::Showing {
                index: active.index,
            },
            None => RotationState::Idle,
        }
    }

    /// Stop rotating. The last published frame stays readable from existing receivers.
    pub fn shutdown(self) {
        // Drop aborts the task.
    }
}

impl Drop for RotationController {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    clock: Arc<dyn Clock>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    frames: watch::Sender<Option<ActiveScene>>,
) {
    let mut rotation = SceneRotation::new();

    let timer = tokio::time::sleep_until(Instant::now());
    tokio::pin!(timer);

    let mut recheck = tokio::time::interval_at(Instant::now() + ELIGIBILITY_RECHECK, ELIGIBILITY_RECHECK);
    recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Scene rotation started");

    loop {
        let armed = rotation.deadline();
        if let Some(deadline) = armed {
            if timer.deadline() != deadline {
                timer.as_mut().reset(deadline);
            }
        }

        tokio::select! {
            () = &mut timer, if armed.is_some() => {
                rotation.on_timer(Instant::now(), clock.time_of_day());
            }
            _ = recheck.tick() => {
                rotation.refresh_eligibility(Instant::now(), clock.time_of_day());
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    break;
                };
                let (now, time) = (Instant::now(), clock.time_of_day());
                match command {
                    Command::ReplaceScenes(scenes) => {
                        debug!("Rotation received {} scene(s)", scenes.len());
                        rotation.replace_scenes(scenes, now, time);
                    }
                    Command::Next => {
                        rotation.advance(now, time);
                    }
                    Command::JumpTo(index) => {
                        if !rotation.jump_to(index, now, time) {
                            debug!("Ignoring jump to scene position {}: not eligible", index);
                        }
                    }
                    Command::JumpToScene(scene_id) => {
                        if !rotation.jump_to_scene(scene_id, now, time) {
                            debug!("Ignoring jump to scene {}: not eligible", scene_id);
                        }
                    }
                }
            }
        }

        publish(&frames, rotation.active());
    }

    info!("Scene rotation stopped");
}

fn publish(frames: &watch::Sender<Option<ActiveScene>>, next: Option<ActiveScene>) {
    frames.send_if_modified(|current| {
        let unchanged = match (current.as_ref(), next.as_ref()) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_same_frame(b),
            _ => false,
        };
        if unchanged {
            return false;
        }
        match next.as_ref() {
            Some(active) => debug!(
                "Showing scene {} '{}' ({}/{}, transition {})",
                active.scene.id,
                active.scene.name,
                active.index + 1,
                active.eligible_count,
                active.scene.transition
            ),
            None => debug!("Rotation idle: no eligible scenes"),
        }
        *current = next;
        true
    });
}
