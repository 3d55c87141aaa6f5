use std::env;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Utc;

use timebar::timer::{PRESET_MINUTES, format_duration, format_remaining, parse_duration, preset_title};
use timebar::{
    CancelScope, JsonFileStore, SWEEP_PERIOD, Settings, SettingsStore, SystemNotifier, TimerEvent,
    TimerRegistry,
};

const USAGE: &str = "Usage:
  timebar start <duration>... [--title <text>]
  timebar presets
  timebar toggle notifications|sound
  timebar settings

  <duration> format: 25m, 30s, 1h, 1m30s (a bare number means minutes)";

fn main() {
    timebar::logging::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("start") => start(&args[1..]),
        Some("presets") => {
            list_presets();
            Ok(())
        }
        Some("toggle") => toggle(args.get(1).map(String::as_str)),
        Some("settings") => {
            show_settings();
            Ok(())
        }
        _ => Err(USAGE.to_string()),
    };

    if let Err(message) = result {
        eprintln!("{}", message);
        std::process::exit(2);
    }
}

fn start(args: &[String]) -> Result<(), String> {
    let mut durations = Vec::new();
    let mut title = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--title" {
            let value = iter.next().ok_or("Error: --title flag requires a value")?;
            title = Some(value.clone());
        } else {
            let duration = parse_duration(arg).map_err(|e| format!("Error: {}", e))?;
            durations.push(duration);
        }
    }
    if durations.is_empty() {
        return Err(USAGE.to_string());
    }

    let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::at_default_path());
    let registry = TimerRegistry::new(Arc::new(SystemNotifier::new()), store);
    registry.subscribe(print_event);

    let mut sweeper = registry
        .spawn_sweeper(SWEEP_PERIOD)
        .map_err(|e| format!("Error: could not start sweeper: {}", e))?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|e| format!("Error setting Ctrl-C handler: {}", e))?;

    for duration in durations {
        let label = title
            .clone()
            .unwrap_or_else(|| format_duration(duration.as_secs()));
        registry.start_timer(duration, label);
    }

    while registry.has_active_timers() {
        if interrupted.load(Ordering::SeqCst) {
            println!("\n🛑 Interrupted!");
            registry.cancel_all_timers();
            break;
        }
        render_status(&registry);
        thread::sleep(Duration::from_millis(250));
    }

    // complete anything that expired since the last tick
    registry.sweep();
    sweeper.stop();
    registry.flush();

    if !interrupted.load(Ordering::SeqCst) {
        // completion banners are delivered from their own threads
        thread::sleep(Duration::from_millis(500));
    }
    Ok(())
}

fn render_status(registry: &TimerRegistry) {
    let now = Utc::now();
    let timers = registry.active_timers();
    let Some(next) = timers.iter().min_by_key(|t| t.end_time) else {
        return;
    };

    let progress = next.progress(now);
    let bar_width = 20;
    let filled_blocks = (progress * bar_width as f64) as usize;
    let empty_blocks = bar_width - filled_blocks;
    let others = if timers.len() > 1 {
        format!(" (+{} more)", timers.len() - 1)
    } else {
        String::new()
    };

    print!(
        "\r⏱️  {} {} [{}{}] {}%{}   ",
        next.display_name(),
        format_remaining(next.remaining(now)),
        "█".repeat(filled_blocks),
        "░".repeat(empty_blocks),
        (progress * 100.0) as u8,
        others
    );
    let _ = std::io::stdout().flush();
}

fn print_event(event: &TimerEvent) {
    match event {
        TimerEvent::TimerStarted(timer) => {
            println!("▶️  Started {} ({})", timer.display_name(), timer.id)
        }
        TimerEvent::TimerCompleted { display_name, .. } => {
            println!("\r✅ {} complete!{}", display_name, " ".repeat(40))
        }
        TimerEvent::TimerCancelled(CancelScope::All) => println!("All timers cancelled"),
        TimerEvent::TimerCancelled(CancelScope::One(id)) => println!("Cancelled {}", id),
        TimerEvent::TimerUpdated(_) => {}
    }
}

fn list_presets() {
    for minutes in PRESET_MINUTES {
        println!("{:>4}m  {}", minutes, preset_title(minutes));
    }
}

fn toggle(which: Option<&str>) -> Result<(), String> {
    let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::at_default_path());
    let registry = TimerRegistry::new(Arc::new(SystemNotifier::new()), store);

    match which {
        Some("notifications") => {
            let enabled = registry.toggle_notifications();
            println!("Notifications {}", on_off(enabled));
        }
        Some("sound") => {
            let enabled = registry.toggle_sound();
            println!("Sound {}", on_off(enabled));
        }
        _ => return Err(USAGE.to_string()),
    }
    Ok(())
}

fn show_settings() {
    let store = JsonFileStore::at_default_path();
    let settings = Settings::load(&store);
    println!("Settings file: {}", store.path().display());
    println!("Notifications: {}", on_off(settings.notifications_enabled));
    println!("Sound:         {}", on_off(settings.sound_enabled));
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
