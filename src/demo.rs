use bevy::core::FrameCount;
use bevy::prelude::*;
use std::sync::{Arc, RwLock};
use tickwire::{
    Args, CommandServerAppExt, DiscoveryError, InvocationError, OperationMeta, ParamSpec,
    RegistryBuilder, ResponseHandle, SourceFn,
};

const RESOURCE_KINDS: &[&str] = &["Wood", "Stone", "Iron", "Food", "Gold"];

/// Frames the map stays hidden after startup, so `/revealMap` has a
/// not-ready case to report.
const READY_AFTER_FRAMES: u32 = 120;

#[derive(Resource, Default)]
pub struct Colony {
    pub map_revealed: bool,
    pub stockpile: Vec<(String, i64)>,
}

#[derive(Default, Clone)]
struct SnapshotValues {
    frame_count: u32,
    map_revealed: bool,
    ready_to_play: bool,
}

/// Variables are read from request threads, so they see a copy refreshed
/// once per tick instead of the `World`.
#[derive(Resource, Clone, Default)]
struct VariableSnapshot(Arc<RwLock<SnapshotValues>>);

impl VariableSnapshot {
    fn read(&self) -> SnapshotValues {
        match self.0.read() {
            Ok(values) => values.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

pub struct DemoPlugin;

impl Plugin for DemoPlugin {
    fn build(&self, app: &mut App) {
        let snapshot = VariableSnapshot::default();
        app.init_resource::<Colony>()
            .insert_resource(snapshot.clone())
            .add_systems(PostUpdate, update_snapshot)
            .add_operation_source(SourceFn::new("demo", move |builder: &mut RegistryBuilder| {
                register_demo(builder, snapshot.clone())
            }));
    }
}

fn update_snapshot(frames: Res<FrameCount>, colony: Res<Colony>, snapshot: Res<VariableSnapshot>) {
    let mut values = match snapshot.0.write() {
        Ok(values) => values,
        Err(poisoned) => poisoned.into_inner(),
    };
    values.frame_count = frames.0;
    values.map_revealed = colony.map_revealed;
    values.ready_to_play = frames.0 >= READY_AFTER_FRAMES;
}

fn register_demo(builder: &mut RegistryBuilder, snapshot: VariableSnapshot) -> Result<(), DiscoveryError> {
    builder.register(
        OperationMeta::new("/ping")
            .category("Main")
            .description("Replies with Pong!"),
        |_: &mut World, response: &mut ResponseHandle, _: &Args| {
            response.log_response("Pong!");
            Ok(())
        },
    )?;

    builder.register(
        OperationMeta::new("/inputTest")
            .category("Main")
            .description("Echoes its arguments")
            .param(ParamSpec::string("TestCase"))
            .param(ParamSpec::string("input").with_default("test"))
            .param(ParamSpec::string("input2").with_default("testlols")),
        input_test,
    )?;

    builder.register(
        OperationMeta::new("/secondInputTest")
            .category("Main")
            .param(ParamSpec::string("input"))
            .param(ParamSpec::float("scale").with_default("1.0")),
        |_: &mut World, response: &mut ResponseHandle, args: &Args| {
            response.log_response(&format!(
                "Received: '{}' (scale {})",
                args.str("input"),
                args.float("scale")
            ));
            Ok(())
        },
    )?;

    builder.register(
        OperationMeta::new("/spawnResource")
            .category("Test")
            .description("Adds resources to the stockpile")
            .param(ParamSpec::string("resource").with_autocomplete(|| {
                RESOURCE_KINDS.iter().map(|s| s.to_string()).collect()
            }))
            .param(ParamSpec::int("amount").with_default("10")),
        spawn_resource,
    )?;

    builder.register(
        OperationMeta::new("/revealMap")
            .category("Test")
            .description("Reveals the whole map"),
        reveal_map,
    )?;

    let frames = snapshot.clone();
    builder.register_variable("FrameCount", move || frames.read().frame_count.to_string());
    let revealed = snapshot.clone();
    builder.register_variable("MapRevealed", move || revealed.read().map_revealed.to_string());
    builder.register_variable("GameReadyToPlay", move || {
        snapshot.read().ready_to_play.to_string()
    });
    Ok(())
}

fn input_test(_: &mut World, response: &mut ResponseHandle, args: &Args) -> Result<(), InvocationError> {
    let mut out = String::new();
    for (name, value) in args.iter() {
        out.push_str(&format!("{name}: '{value}'\n"));
    }
    response.log_response(&out);
    Ok(())
}

fn spawn_resource(world: &mut World, response: &mut ResponseHandle, args: &Args) -> Result<(), InvocationError> {
    let kind = args.str("resource");
    let Some(kind) = RESOURCE_KINDS.iter().find(|k| k.eq_ignore_ascii_case(kind)) else {
        return Err(format!("unknown resource '{kind}'").into());
    };
    let amount = args.int("amount");
    let mut colony = world
        .get_resource_mut::<Colony>()
        .ok_or("colony is not loaded")?;
    let total = match colony.stockpile.iter_mut().find(|(k, _)| k == kind) {
        Some((_, count)) => {
            *count += amount;
            *count
        }
        None => {
            colony.stockpile.push((kind.to_string(), amount));
            amount
        }
    };
    response.json(&serde_json::json!({ "resource": kind, "added": amount, "total": total }));
    Ok(())
}

fn reveal_map(world: &mut World, response: &mut ResponseHandle, _: &Args) -> Result<(), InvocationError> {
    let ready = world
        .get_resource::<FrameCount>()
        .is_some_and(|frames| frames.0 >= READY_AFTER_FRAMES);
    if !ready {
        response.log_response("Must be in-game to reveal map!");
        return Ok(());
    }
    let mut colony = world
        .get_resource_mut::<Colony>()
        .ok_or("colony is not loaded")?;
    if colony.map_revealed {
        response.log_response("Map already revealed.");
    } else {
        colony.map_revealed = true;
        response.log_response("Map revealed.");
    }
    Ok(())
}
