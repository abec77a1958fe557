use std::sync::Arc;

use chrono::NaiveTime;
use tokio::time::Instant;

use crate::models::{Scene, WidgetPlacement};

/// Where the rotation currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationState {
    /// No eligible scene: the display renders nothing.
    Idle,
    /// Showing the eligible scene at `index`.
    Showing { index: usize },
}

/// Snapshot of the scene on screen, handed to the renderer.
#[derive(Debug, Clone)]
pub struct ActiveScene {
    pub scene: Arc<Scene>,
    /// Position among the currently eligible scenes.
    pub index: usize,
    pub eligible_count: usize,
}

impl ActiveScene {
    pub fn placements(&self) -> &[WidgetPlacement] {
        &self.scene.widgets
    }

    /// True when both snapshots show the same scene content at the same position.
    pub fn is_same_frame(&self, other: &ActiveScene) -> bool {
        Arc::ptr_eq(&self.scene, &other.scene)
            && self.index == other.index
            && self.eligible_count == other.eligible_count
    }
}

#[derive(Debug, Clone)]
struct Current {
    index: usize,
    scene: Arc<Scene>,
    deadline: Instant,
}

/// Scene rotation state machine.
///
/// Only scenes that are enabled and inside their active window take part.
/// Exactly one deadline exists at a time: every transition replaces it, so
/// timers never stack up.
#[derive(Debug, Default)]
pub struct SceneRotation {
    /// All known scenes in rotation order.
    scenes: Vec<Arc<Scene>>,
    /// Subset of `scenes` eligible at the last evaluation.
    eligible: Vec<Arc<Scene>>,
    current: Option<Current>,
}

impl SceneRotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RotationState {
        match &self.current {
            Some(current) => RotationState::Showing {
                index: current.index,
            },
            None => RotationState::Idle,
        }
    }

    pub fn active(&self) -> Option<ActiveScene> {
        self.current.as_ref().map(|current| ActiveScene {
            scene: Arc::clone(&current.scene),
            index: current.index,
            eligible_count: self.eligible.len(),
        })
    }

    pub fn current_scene(&self) -> Option<&Arc<Scene>> {
        self.current.as_ref().map(|current| &current.scene)
    }

    /// Widget placements of the current scene; empty while idle.
    pub fn placements(&self) -> &[WidgetPlacement] {
        self.current
            .as_ref()
            .map(|current| current.scene.widgets.as_slice())
            .unwrap_or(&[])
    }

    /// When the current scene is due to be replaced.
    pub fn deadline(&self) -> Option<Instant> {
        self.current.as_ref().map(|current| current.deadline)
    }

    pub fn eligible(&self) -> &[Arc<Scene>] {
        &self.eligible
    }

    /// Replace the scene list wholesale.
    ///
    /// The current scene keeps its place and its deadline if it is still
    /// eligible; otherwise the first eligible scene starts fresh.
    pub fn replace_scenes(&mut self, scenes: Vec<Scene>, now: Instant, time: NaiveTime) {
        let mut scenes: Vec<Arc<Scene>> = scenes.into_iter().map(Arc::new).collect();
        scenes.sort_by_key(|scene| scene.sort_key());
        self.scenes = scenes;
        self.revalidate(now, time);
    }

    /// Re-evaluate active windows without a list change.
    pub fn refresh_eligibility(&mut self, now: Instant, time: NaiveTime) {
        self.revalidate(now, time);
    }

    /// Advance to the next eligible scene if the current deadline has passed.
    ///
    /// The next deadline is measured from the one that expired, so late
    /// wake-ups do not accumulate drift. If the wake-up is so late that the
    /// next scene's whole duration has already elapsed, it is measured from
    /// `now` instead.
    pub fn on_timer(&mut self, now: Instant, time: NaiveTime) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        if now < current.deadline {
            return false;
        }
        let expired = current.deadline;
        let previous = Arc::clone(&current.scene);

        self.recompute(time);
        let Some(index) = self.next_after(&previous) else {
            self.current = None;
            return true;
        };

        let scene = Arc::clone(&self.eligible[index]);
        let duration = scene.display_duration();
        let mut deadline = expired + duration;
        if deadline <= now {
            deadline = now + duration;
        }
        self.current = Some(Current {
            index,
            scene,
            deadline,
        });
        true
    }

    /// Operator "next": show the following eligible scene with a fresh timer.
    ///
    /// "Following" is relative to the scene on screen when called, even if
    /// that scene has just left its window.
    pub fn advance(&mut self, now: Instant, time: NaiveTime) -> bool {
        let previous = self.current_scene().cloned();
        self.revalidate(now, time);
        let next = match previous {
            Some(previous) => self.next_after(&previous),
            None => (!self.eligible.is_empty()).then_some(0),
        };
        match next {
            Some(index) => {
                self.show(index, now);
                true
            }
            None => false,
        }
    }

    /// Operator jump to the eligible scene at `index`, restarting its timer.
    ///
    /// A rejected jump still reconciles the current scene with the eligible set.
    pub fn jump_to(&mut self, index: usize, now: Instant, time: NaiveTime) -> bool {
        self.revalidate(now, time);
        if index >= self.eligible.len() {
            return false;
        }
        self.show(index, now);
        true
    }

    /// Operator jump to a scene by id, if it is currently eligible.
    pub fn jump_to_scene(&mut self, scene_id: i64, now: Instant, time: NaiveTime) -> bool {
        self.revalidate(now, time);
        match self.eligible.iter().position(|scene| scene.id == scene_id) {
            Some(index) => {
                self.show(index, now);
                true
            }
            None => false,
        }
    }

    fn recompute(&mut self, time: NaiveTime) {
        self.eligible = self
            .scenes
            .iter()
            .filter(|scene| scene.is_eligible_at(time))
            .cloned()
            .collect();
    }

    fn revalidate(&mut self, now: Instant, time: NaiveTime) {
        self.recompute(time);

        let kept = self.current.take().and_then(|current| {
            self.eligible
                .iter()
                .position(|scene| scene.id == current.scene.id)
                .map(|index| Current {
                    index,
                    scene: Arc::clone(&self.eligible[index]),
                    deadline: current.deadline,
                })
        });

        match kept {
            Some(current) => self.current = Some(current),
            None if self.eligible.is_empty() => self.current = None,
            None => self.show(0, now),
        }
    }

    /// Index of the first eligible scene after `previous` in rotation order,
    /// wrapping to the start. Works even if `previous` is no longer eligible.
    fn next_after(&self, previous: &Scene) -> Option<usize> {
        if self.eligible.is_empty() {
            return None;
        }
        let key = previous.sort_key();
        Some(
            self.eligible
                .iter()
                .position(|scene| scene.sort_key() > key)
                .unwrap_or(0),
        )
    }

    fn show(&mut self, index: usize, now: Instant) {
        let scene = Arc::clone(&self.eligible[index]);
        let deadline = now + scene.display_duration();
        self.current = Some(Current {
            index,
            scene,
            deadline,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransitionStyle;
    use std::time::Duration;

    fn scene(id: i64, order: i32, seconds: u32) -> Scene {
        Scene {
            id,
            building_id: 1,
            name: format!("Scene {id}"),
            order,
            duration_seconds: seconds,
            transition: TransitionStyle::Fade,
            enabled: true,
            active_from: None,
            active_until: None,
            widgets: Vec::new(),
        }
    }

    fn windowed(id: i64, order: i32, from: (u32, u32), until: (u32, u32)) -> Scene {
        Scene {
            active_from: NaiveTime::from_hms_opt(from.0, from.1, 0),
            active_until: NaiveTime::from_hms_opt(until.0, until.1, 0),
            ..scene(id, order, 10)
        }
    }

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn current_id(rotation: &SceneRotation) -> Option<i64> {
        rotation.current_scene().map(|scene| scene.id)
    }

    #[test]
    fn test_starts_idle() {
        let rotation = SceneRotation::new();
        assert_eq!(rotation.state(), RotationState::Idle);
        assert!(rotation.placements().is_empty());
        assert_eq!(rotation.deadline(), None);
    }

    #[test]
    fn test_durations_drive_rotation_and_wrap() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(1, 1, 5), scene(2, 2, 10), scene(3, 3, 8)], t0, noon());
        assert_eq!(current_id(&rotation), Some(1));

        assert!(!rotation.on_timer(t0 + secs(4), noon()));
        assert!(rotation.on_timer(t0 + secs(5), noon()));
        assert_eq!(current_id(&rotation), Some(2));

        assert!(rotation.on_timer(t0 + secs(15), noon()));
        assert_eq!(current_id(&rotation), Some(3));

        assert!(rotation.on_timer(t0 + secs(23), noon()));
        assert_eq!(current_id(&rotation), Some(1));
        assert_eq!(rotation.state(), RotationState::Showing { index: 0 });
    }

    #[test]
    fn test_late_wakeups_do_not_drift() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(1, 1, 5), scene(2, 2, 10)], t0, noon());

        // Timer fires 300ms late; the next deadline is still anchored at t0 + 15s.
        rotation.on_timer(t0 + Duration::from_millis(5300), noon());
        assert_eq!(rotation.deadline(), Some(t0 + secs(15)));
    }

    #[test]
    fn test_very_late_wakeup_restarts_from_now() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(1, 1, 5), scene(2, 2, 10)], t0, noon());

        let woke = t0 + secs(60);
        rotation.on_timer(woke, noon());
        assert_eq!(current_id(&rotation), Some(2));
        assert_eq!(rotation.deadline(), Some(woke + secs(10)));
    }

    #[test]
    fn test_n_advances_return_to_start() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        let scenes: Vec<Scene> = (1..=5).map(|id| scene(id, id as i32, 7)).collect();
        rotation.replace_scenes(scenes, t0, noon());

        let start = rotation.state();
        for _ in 0..5 {
            rotation.advance(t0, noon());
        }
        assert_eq!(rotation.state(), start);
    }

    #[test]
    fn test_rotation_follows_order_not_list_position() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(10, 3, 5), scene(20, 1, 5), scene(30, 2, 5)], t0, noon());

        let mut seen = vec![current_id(&rotation).unwrap()];
        for _ in 0..2 {
            rotation.advance(t0, noon());
            seen.push(current_id(&rotation).unwrap());
        }
        assert_eq!(seen, vec![20, 30, 10]);
    }

    #[test]
    fn test_scene_outside_window_is_skipped() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(
            vec![
                scene(1, 1, 5),
                windowed(2, 2, (20, 0), (22, 0)),
                scene(3, 3, 5),
            ],
            t0,
            noon(),
        );

        for _ in 0..6 {
            rotation.advance(t0, noon());
            assert_ne!(current_id(&rotation), Some(2));
        }
    }

    #[test]
    fn test_timer_rechecks_window_at_fire_time() {
        let t0 = Instant::now();
        let evening = NaiveTime::from_hms_opt(20, 0, 30).unwrap();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(
            vec![scene(1, 1, 5), windowed(2, 2, (20, 0), (22, 0))],
            t0,
            NaiveTime::from_hms_opt(19, 59, 50).unwrap(),
        );
        assert_eq!(rotation.eligible().len(), 1);

        rotation.on_timer(t0 + secs(5), evening);
        assert_eq!(current_id(&rotation), Some(2));
    }

    #[test]
    fn test_disabled_scenes_never_show() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        let mut hidden = scene(2, 2, 5);
        hidden.enabled = false;
        rotation.replace_scenes(vec![scene(1, 1, 5), hidden], t0, noon());

        rotation.advance(t0, noon());
        assert_eq!(current_id(&rotation), Some(1));
        assert_eq!(rotation.eligible().len(), 1);
    }

    #[test]
    fn test_refresh_keeps_current_scene_and_deadline() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(1, 1, 5), scene(2, 2, 10)], t0, noon());
        rotation.on_timer(t0 + secs(5), noon());
        let deadline = rotation.deadline();

        let mut renamed = scene(2, 2, 10);
        renamed.name = "Renamed".to_string();
        rotation.replace_scenes(vec![scene(1, 1, 5), renamed, scene(3, 3, 5)], t0 + secs(7), noon());

        assert_eq!(current_id(&rotation), Some(2));
        assert_eq!(rotation.current_scene().unwrap().name, "Renamed");
        assert_eq!(rotation.deadline(), deadline);
    }

    #[test]
    fn test_refresh_resets_when_current_scene_disappears() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(1, 1, 5), scene(2, 2, 10)], t0, noon());
        rotation.on_timer(t0 + secs(5), noon());
        assert_eq!(current_id(&rotation), Some(2));

        let now = t0 + secs(6);
        rotation.replace_scenes(vec![scene(1, 1, 5), scene(3, 3, 8)], now, noon());
        assert_eq!(current_id(&rotation), Some(1));
        assert_eq!(rotation.deadline(), Some(now + secs(5)));
    }

    #[test]
    fn test_empty_list_goes_idle() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(1, 1, 5)], t0, noon());
        rotation.replace_scenes(Vec::new(), t0 + secs(1), noon());

        assert_eq!(rotation.state(), RotationState::Idle);
        assert!(rotation.active().is_none());
        assert!(!rotation.on_timer(t0 + secs(10), noon()));
    }

    #[test]
    fn test_window_closing_goes_idle_on_recheck() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(
            vec![windowed(1, 1, (8, 0), (9, 0))],
            t0,
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        );
        assert!(rotation.active().is_some());

        rotation.refresh_eligibility(t0 + secs(60), NaiveTime::from_hms_opt(9, 0, 30).unwrap());
        assert_eq!(rotation.state(), RotationState::Idle);
    }

    #[test]
    fn test_jump_restarts_timer() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(vec![scene(1, 1, 5), scene(2, 2, 10), scene(3, 3, 8)], t0, noon());

        let jumped_at = t0 + secs(3);
        assert!(rotation.jump_to(2, jumped_at, noon()));
        assert_eq!(current_id(&rotation), Some(3));
        assert_eq!(rotation.deadline(), Some(jumped_at + secs(8)));

        assert!(!rotation.jump_to(9, jumped_at, noon()));
        assert_eq!(current_id(&rotation), Some(3));

        assert!(rotation.jump_to_scene(2, jumped_at, noon()));
        assert_eq!(rotation.state(), RotationState::Showing { index: 1 });
        assert!(!rotation.jump_to_scene(99, jumped_at, noon()));
    }

    #[test]
    fn test_rejected_jump_moves_off_a_closed_window() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(
            vec![windowed(1, 1, (8, 0), (9, 0)), scene(2, 2, 5), scene(3, 3, 5)],
            t0,
            NaiveTime::from_hms_opt(8, 59, 0).unwrap(),
        );
        assert_eq!(current_id(&rotation), Some(1));

        let later = t0 + secs(90);
        let after_window = NaiveTime::from_hms_opt(9, 0, 30).unwrap();
        assert!(!rotation.jump_to(7, later, after_window));
        assert_eq!(current_id(&rotation), Some(2));
        assert_eq!(rotation.state(), RotationState::Showing { index: 0 });
        assert_eq!(rotation.active().unwrap().eligible_count, 2);
        assert_eq!(rotation.deadline(), Some(later + secs(5)));

        assert!(!rotation.jump_to_scene(1, later, after_window));
        assert_eq!(current_id(&rotation), Some(2));
    }

    #[test]
    fn test_jump_keeps_index_in_step_with_eligibility() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(
            vec![windowed(1, 1, (8, 0), (9, 0)), scene(2, 2, 5), scene(3, 3, 5)],
            t0,
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        );
        assert!(rotation.jump_to_scene(3, t0, NaiveTime::from_hms_opt(8, 30, 0).unwrap()));
        assert_eq!(rotation.state(), RotationState::Showing { index: 2 });

        // Scene 1 closes; scene 3 is now second among the eligible.
        assert!(rotation.jump_to_scene(3, t0 + secs(1), NaiveTime::from_hms_opt(9, 1, 0).unwrap()));
        assert_eq!(rotation.state(), RotationState::Showing { index: 1 });
    }

    #[test]
    fn test_advance_from_a_closed_window_goes_to_the_following_scene() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(
            vec![scene(1, 1, 5), windowed(2, 2, (8, 0), (9, 0)), scene(3, 3, 5)],
            t0,
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        );
        assert!(rotation.jump_to_scene(2, t0, NaiveTime::from_hms_opt(8, 30, 0).unwrap()));

        let later = t0 + secs(2);
        assert!(rotation.advance(later, NaiveTime::from_hms_opt(9, 0, 30).unwrap()));
        assert_eq!(current_id(&rotation), Some(3));
        assert_eq!(rotation.state(), RotationState::Showing { index: 1 });
        assert_eq!(rotation.deadline(), Some(later + secs(5)));
    }

    #[test]
    fn test_advance_with_nothing_eligible_goes_idle() {
        let t0 = Instant::now();
        let mut rotation = SceneRotation::new();
        rotation.replace_scenes(
            vec![windowed(1, 1, (8, 0), (9, 0))],
            t0,
            NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        );

        assert!(!rotation.advance(t0 + secs(1), NaiveTime::from_hms_opt(10, 0, 0).unwrap()));
        assert_eq!(rotation.state(), RotationState::Idle);
    }
}
