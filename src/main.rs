//! Area Shell Core
//!
//! Replays a scripted shell session against the headless stage: a calendar
//! popover grabbed from the panel, a dimming lightbox stacked over it and
//! released out of order, and a hidden weather widget refreshed by the idle
//! flush. Every transition is logged.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use area_shellcore::config::Config;
use area_shellcore::host::Stage;
use area_shellcore::host::headless::HeadlessStage;
use area_shellcore::modal::{ActionMode, PushParams};
use area_shellcore::ShellController;

fn main() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let use_defaults = args.iter().any(|arg| arg == "--defaults" || arg == "-d");

    let config = if use_defaults {
        Config::default()
    } else {
        Config::load().context("Failed to load configuration")?
    };

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Area shell core session");

    let stage = Rc::new(HeadlessStage::new());
    let controller = ShellController::new(stage.clone(), &config)?;
    run_session(&stage, &controller, &config)?;

    info!("Session finished");
    Ok(())
}

/// Drive the controller through one popover/lightbox/idle cycle
fn run_session(
    stage: &HeadlessStage,
    controller: &ShellController,
    config: &Config,
) -> Result<()> {
    let panel = stage.create_actor("panel");
    let clock = stage.create_actor("panel-clock");
    let calendar = stage.create_actor("calendar-popover");
    let weather = stage.create_actor("weather-widget");
    let lightbox = stage.create_actor("lightbox");
    stage.set_mapped(panel, true);
    stage.set_mapped(clock, true);
    controller.startup_complete();

    let calendar_refreshes = Rc::new(Cell::new(0u32));
    let counter = calendar_refreshes.clone();
    let calendar_work = controller.initialize_deferred_work(calendar, move || {
        counter.set(counter.get() + 1);
        info!("Calendar events reloaded ({})", counter.get());
    });

    let weather_refreshes = Rc::new(Cell::new(0u32));
    let counter = weather_refreshes.clone();
    controller.initialize_deferred_work(weather, move || {
        counter.set(counter.get() + 1);
        info!("Weather forecast refreshed ({})", counter.get());
    });

    // Clicking the clock opens the calendar
    stage.set_key_focus(Some(clock));
    stage.set_event_time(1_000);
    let calendar_grab = controller
        .push_modal(calendar, PushParams::with_action_mode(ActionMode::POPUP))
        .context("Calendar popover could not grab input")?;
    stage.set_mapped(calendar, true);
    controller.queue_deferred_work(calendar_work);
    controller.queue_deferred_work(calendar_work);
    stage.dispatch_frame();

    // A system dialog dims the screen on top of the popover
    stage.set_event_time(2_000);
    stage.set_mapped(lightbox, true);
    let lightbox_grab = controller
        .push_modal(lightbox, PushParams::with_action_mode(ActionMode::SYSTEM_MODAL))
        .context("Lightbox could not grab input")?;

    // The popover closes underneath the dialog
    stage.set_mapped(calendar, false);
    controller.pop_modal(calendar_grab, Some(2_500))?;
    info!(
        "Calendar released under lightbox: modal_count={}, action_mode={:?}",
        controller.modal_count(),
        controller.action_mode()
    );

    // The dialog goes away by being destroyed rather than popped
    stage.destroy_actor(lightbox);
    info!(
        "Lightbox destroyed: focus={:?}, action_mode={:?}, grab released={}",
        stage.key_focus().and_then(|actor| stage.actor_name(actor)),
        controller.action_mode(),
        !controller.modal().contains(lightbox_grab)
    );

    // The weather widget never became visible; the idle flush catches it
    stage.advance(config.deferred.idle_timeout());
    controller.flush();

    info!(
        "Calendar refreshes={}, weather refreshes={}, unredirect disabled={}, modal ended={}",
        calendar_refreshes.get(),
        weather_refreshes.get(),
        stage.unredirect_disabled(),
        stage.modal_ended_count()
    );
    Ok(())
}
