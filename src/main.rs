use anyhow::Result;
use clap::{Parser, Subcommand};
use hud_watch::audio_watcher::AudioBackend;
use hud_watch::brightness::BrightnessSource;
use hud_watch::config::Config;
use hud_watch::constants;
use hud_watch::coreaudio::macos::CoreAudioBackend;
use hud_watch::dispatcher::{event_channel, Dispatcher};
use hud_watch::display::macos::DisplayBrightness;
use hud_watch::event_tap::macos::SystemEventTap;
use hud_watch::intercept::KeyIntercept;
use hud_watch::level::Level;
use hud_watch::sink::{LogSink, SharedSink};
use hud_watch::tray::{TrayHud, TrayMenuEvent};
use std::rc::Rc;
use std::time::{Duration, Instant};
use tao::event::Event;
use tao::event_loop::{ControlFlow, EventLoop};
#[cfg(target_os = "macos")]
use tao::platform::macos::{ActivationPolicy, EventLoopExtMacOS};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hud-watch")]
#[command(about = "Menu bar HUD for volume and brightness changes", long_about = None)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG and settings.yaml
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run without a tray icon and log every reported change
    Listen,
    /// Read volume and brightness once and report which sources work
    Probe,
    /// Print the location of settings.yaml
    ConfigPath,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::ConfigPath) = cli.command {
        println!("{}", Config::config_path()?.display());
        return Ok(());
    }

    let config = Config::load_or_create()?;
    init_logging(&config.log_level, cli.verbose);

    match cli.command {
        Some(Commands::Probe) => probe_command(),
        Some(Commands::Listen) => run_app(config, false),
        _ => {
            let show_tray = config.hud.show_tray;
            run_app(config, show_tray)
        }
    }
}

fn init_logging(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn probe_command() -> Result<()> {
    println!("HUD Watch - Source Probe");
    println!();

    let audio = CoreAudioBackend::new();
    match audio.default_output_device() {
        Ok(device) => {
            println!("Output device: {:?}", device);
            match audio.read_volume(device) {
                Ok(raw) => match Level::clamp(raw) {
                    Some(level) => println!("  Volume: {} (raw {:.4})", level, raw),
                    None => println!("  Volume: no reading"),
                },
                Err(e) => println!("  Volume: {}", e),
            }
            match audio.read_muted(device) {
                Ok(muted) => println!("  Muted: {}", muted),
                Err(e) => println!("  Muted: {}", e),
            }
        }
        Err(e) => println!("Output device: {}", e),
    }

    let display = DisplayBrightness::new();
    match display.read_brightness() {
        Ok(raw) => match Level::clamp(raw) {
            Some(level) => println!("Brightness: {} (raw {:.4})", level, raw),
            None => println!("Brightness: no reading"),
        },
        Err(e) => println!("Brightness: {} (key events only)", e),
    }

    let (notifier, _events) = event_channel();
    match SystemEventTap::new().install(notifier) {
        Ok(_guard) => println!("Key intercept: available"),
        Err(e) => println!("Key intercept: {}", e),
    }

    Ok(())
}

fn run_app(config: Config, show_tray: bool) -> Result<()> {
    tracing::info!("HUD Watch starting");

    // Create event loop
    #[cfg_attr(not(target_os = "macos"), allow(unused_mut))]
    let mut event_loop = EventLoop::new();

    // Menu-bar only (no Dock icon) - MUST be before run()
    #[cfg(target_os = "macos")]
    event_loop.set_activation_policy(ActivationPolicy::Accessory);

    let tray = if show_tray {
        let hud = TrayHud::new(Duration::from_millis(config.hud.hide_after_ms))?;
        tracing::info!("System tray initialized");
        Some(Rc::new(hud))
    } else {
        None
    };

    let sink: SharedSink = match &tray {
        Some(hud) => hud.clone() as SharedSink,
        None => Rc::new(LogSink),
    };

    let mut dispatcher = Dispatcher::attach(
        &config,
        CoreAudioBackend::new(),
        DisplayBrightness::new(),
        SystemEventTap::new(),
        sink,
    );
    dispatcher.start(Instant::now());

    let frame = Duration::from_millis(constants::event_loop::FRAME_MS);

    // Main event loop
    event_loop.run(move |event, _, control_flow| {
        if let Event::LoopDestroyed = event {
            dispatcher.shutdown();
            return;
        }

        let now = Instant::now();
        let mut wake = now + frame;

        // Route watcher events and run the brightness poll when due
        if let Some(deadline) = dispatcher.pump(now) {
            wake = wake.min(deadline);
        }

        if let Some(hud) = &tray {
            hud.tick(now);

            if let Some(event) = hud.poll_event() {
                match event {
                    TrayMenuEvent::Settings => open_settings(),
                    TrayMenuEvent::Quit => {
                        tracing::info!("Quitting application...");
                        *control_flow = ControlFlow::Exit;
                        return;
                    }
                }
            }
        }

        *control_flow = ControlFlow::WaitUntil(wake);
    });
}

fn open_settings() {
    match Config::config_path() {
        Ok(config_path) => {
            tracing::info!("Settings file: {}", config_path.display());
            #[cfg(target_os = "macos")]
            {
                let _ = std::process::Command::new("open")
                    .arg(config_path)
                    .spawn();
            }
        }
        Err(e) => tracing::warn!("Cannot locate settings: {}", e),
    }
}
