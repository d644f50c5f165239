//! Check system capabilities.

use gazereel_common::config::{config_file_path, AppConfig};
use gazereel_render_engine::encoder::ffmpeg_version;
use gazereel_render_engine::overlay::{load_font, resolve_system_font};

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Gazereel System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg_ok = match ffmpeg_version(&config.video.ffmpeg) {
        Some(version) => {
            println!("[OK] {version}");
            true
        }
        None => {
            println!(
                "[FAIL] {} not runnable (required for rendering)",
                config.video.ffmpeg.display()
            );
            false
        }
    };

    let font = config.video.font_path.clone().or_else(resolve_system_font);
    match font {
        Some(path) => match load_font(&path) {
            Ok(_) => println!("[OK] Overlay font: {}", path.display()),
            Err(err) => println!("[WARN] Overlay font unusable: {err}"),
        },
        None => println!("[WARN] No overlay font found; set video.font_path to draw text"),
    }

    let config_path = config_file_path();
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[OK] Config: defaults ({} not present)", config_path.display());
    }

    println!();
    if ffmpeg_ok {
        println!("Gazereel is ready.");
    } else {
        println!("Install ffmpeg to render videos.");
    }

    Ok(())
}
