//! Match Host Systems
//!
//! Bevy glue around a [`MatchEngine`] resource. Hosts send [`MatchInput`]
//! events and read [`MatchNotice`] events; the engine itself never touches
//! the ECS world.
//!
//! ## System Phases
//!
//! Each fixed step runs three ordered phases:
//!
//! 1. **CollectInputs** - `MatchInput` events are queued on the engine
//! 2. **Tick** - the engine advances to the fixed clock
//! 3. **PublishNotices** - engine notices are re-sent as `MatchNotice` events
//!
//! Systems that react to notices or produce inputs should run after
//! `PublishNotices` or before `CollectInputs` respectively.

use bevy::prelude::*;
use std::time::Duration;

use crate::states::inputs::{MatchInput, MatchNotice};
use crate::states::match_config::MatchSettings;

use super::match_flow::MatchEngine;

/// System set labels for match host ordering.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchHostSet {
    CollectInputs,
    Tick,
    PublishNotices,
}

/// Runs the engine on `FixedUpdate` at the configured quantum. Does nothing
/// until a [`MatchEngine`] resource is inserted.
pub struct MatchHostPlugin {
    pub tick: Duration,
}

impl MatchHostPlugin {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }

    pub fn from_settings(settings: &MatchSettings) -> Self {
        Self::new(settings.tick())
    }
}

impl Default for MatchHostPlugin {
    fn default() -> Self {
        Self::from_settings(&MatchSettings::default())
    }
}

impl Plugin for MatchHostPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<MatchInput>()
            .add_event::<MatchNotice>()
            .insert_resource(Time::<Fixed>::from_duration(self.tick));

        configure_match_host_ordering(app);

        app.add_systems(
            FixedUpdate,
            (
                collect_inputs.in_set(MatchHostSet::CollectInputs),
                tick_engine.in_set(MatchHostSet::Tick),
                publish_notices.in_set(MatchHostSet::PublishNotices),
            )
                .run_if(resource_exists::<MatchEngine>),
        );
    }
}

/// Configures the ordering between the match host phases.
pub fn configure_match_host_ordering(app: &mut App) {
    app.configure_sets(
        FixedUpdate,
        (
            MatchHostSet::CollectInputs,
            MatchHostSet::Tick,
            MatchHostSet::PublishNotices,
        )
            .chain(),
    );
}

fn collect_inputs(mut inputs: EventReader<MatchInput>, engine: Res<MatchEngine>) {
    for input in inputs.read() {
        engine.submit(input.clone());
    }
}

fn tick_engine(time: Res<Time>, mut engine: ResMut<MatchEngine>) {
    engine.tick(time.elapsed());
}

fn publish_notices(mut engine: ResMut<MatchEngine>, mut notices: EventWriter<MatchNotice>) {
    let drained = engine.drain_notices();
    if !drained.is_empty() {
        notices.send_batch(drained);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ArenaLayout, Location};
    use crate::states::play_match::{EntityId, KitRegistry};
    use crate::states::MatchPhase;

    fn layout() -> ArenaLayout {
        let mut layout = ArenaLayout::default();
        layout.set_lobby(Location::new("arena", 0.0, 64.0, 0.0));
        layout.add_map("Ring").unwrap();
        layout
            .set_map_location("Ring", Location::new("arena", 100.0, 64.0, 0.0))
            .unwrap();
        layout
            .add_map_spawn("Ring", Location::new("arena", 100.0, 64.0, 10.0))
            .unwrap();
        layout
    }

    fn host_app() -> App {
        let mut app = App::new();
        app.add_plugins(MatchHostPlugin::default());
        app.init_resource::<Time>();
        app
    }

    #[test]
    fn test_host_phase_ordering() {
        assert_ne!(MatchHostSet::CollectInputs, MatchHostSet::Tick);
        assert_ne!(MatchHostSet::Tick, MatchHostSet::PublishNotices);
    }

    #[test]
    fn test_systems_idle_without_engine() {
        let mut app = host_app();
        app.world_mut().send_event(MatchInput::Start);
        app.world_mut().run_schedule(FixedUpdate);
        assert!(app.world().get_resource::<MatchEngine>().is_none());
    }

    #[test]
    fn test_inputs_reach_engine_and_notices_come_back() {
        let mut app = host_app();
        let engine = MatchEngine::new(MatchSettings::default(), layout(), KitRegistry::builtin().unwrap());
        app.insert_resource(engine);

        app.world_mut().send_event(MatchInput::Join(EntityId(1)));
        app.world_mut().send_event(MatchInput::Start);
        app.world_mut().run_schedule(FixedUpdate);

        let engine = app.world().resource::<MatchEngine>();
        assert_eq!(engine.current_phase(), MatchPhase::LobbyGather);

        let notices = app.world().resource::<Events<MatchNotice>>();
        let mut reader = notices.get_cursor();
        let sent: Vec<&MatchNotice> = reader.read(notices).collect();
        assert!(sent.contains(&&MatchNotice::PhaseChanged {
            from: MatchPhase::Idle,
            to: MatchPhase::LobbyGather,
        }));
    }
}
