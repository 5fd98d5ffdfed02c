mod demo;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use std::time::Duration;
use tickwire::{CommandServerPlugin, ServerConfig, ServerLog};

fn main() {
    let mut app = App::new();
    // Headless: no window, no rendering, just the ECS ticking at 60 Hz.
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / 60.0,
        ))),
    )
    .add_plugins(LogPlugin::default());

    // Loading sets the log's level, so config diagnostics are filtered by
    // the level they configure.
    let log = ServerLog::default();
    let config = ServerConfig::load(&log);
    println!(
        "[Tickwire] Config loaded: port {}, debug level {}",
        config.port(),
        config.debug_level()
    );

    app.insert_resource(log)
        .add_plugins(CommandServerPlugin::new(config))
        .add_plugins(demo::DemoPlugin);

    app.run();
}
