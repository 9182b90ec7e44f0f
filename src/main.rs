//! designlog-snip: capture a region of the primary monitor.
//!
//! Runs the display capture flow with a scripted drag instead of a live
//! pointer, so a region can be grabbed from scripts.
//!
//! Usage:
//!   designlog-snip <x> <y> <width> <height>                 Writes snip.png
//!   designlog-snip <x> <y> <width> <height> --out a.png     Custom output path
//!   designlog-snip <x> <y> <width> <height> --keywords      Also print keywords
//!
//! Coordinates are screen CSS pixels (logical pixels on scaled displays).

use std::path::PathBuf;
use std::process::ExitCode;

use designlog_capture::capture::{primary_monitor_metrics, PrimaryMonitor};
use designlog_capture::overlay::{overlay_channel, OverlayInput, OverlayView, Point, SelectionRect};
use designlog_capture::{
    CaptureOrchestrator, CaptureStrategy, ChatCompletionsClient, Config, KeywordService,
};

/// Replays one drag as soon as the overlay is up.
struct ScriptedDrag {
    input: OverlayInput,
    start: Point,
    end: Point,
}

impl OverlayView for ScriptedDrag {
    fn show(&mut self) {
        self.input.drag(self.start, self.end);
    }

    fn render_selection(&mut self, rect: &SelectionRect) {
        log::debug!("[OVERLAY] Selection now {:?}", rect);
    }

    fn hide(&mut self) {}
}

struct Args {
    rect: SelectionRect,
    out: PathBuf,
    keywords: bool,
}

fn usage() -> ExitCode {
    eprintln!("Usage:");
    eprintln!("  designlog-snip <x> <y> <width> <height> [--out <file.png>] [--keywords]");
    ExitCode::from(2)
}

fn parse_args(args: &[String]) -> Option<Args> {
    let numbers: Vec<f64> = args
        .iter()
        .take(4)
        .map(|a| a.parse().ok())
        .collect::<Option<_>>()?;
    let &[left, top, width, height] = numbers.as_slice() else {
        return None;
    };

    let mut out = PathBuf::from("snip.png");
    let mut keywords = false;
    let mut rest = args[4..].iter();
    while let Some(flag) = rest.next() {
        match flag.as_str() {
            "--out" => out = PathBuf::from(rest.next()?),
            "--keywords" => keywords = true,
            _ => return None,
        }
    }

    Some(Args {
        rect: SelectionRect {
            left,
            top,
            width,
            height,
        },
        out,
        keywords,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    designlog_capture::init_logging();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    let Some(args) = parse_args(&argv) else {
        return usage();
    };

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let metrics = match primary_monitor_metrics() {
        Ok(m) => m,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let (input, events) = overlay_channel();
    let view = ScriptedDrag {
        input,
        start: Point::new(args.rect.left, args.rect.top),
        end: Point::new(args.rect.right(), args.rect.bottom()),
    };
    let orchestrator = CaptureOrchestrator::new(config.capture.clone(), Box::new(view), events);

    let mut source = PrimaryMonitor::new();
    let image = match orchestrator
        .start_capture(CaptureStrategy::Display {
            source: &mut source,
            metrics: &metrics,
        })
        .await
    {
        Ok(image) => image,
        Err(e) => {
            eprintln!("No image captured: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let written = image
        .decode_bytes()
        .map_err(|e| e.to_string())
        .and_then(|bytes| std::fs::write(&args.out, bytes).map_err(|e| e.to_string()));
    if let Err(e) = written {
        eprintln!("Failed to write {}: {}", args.out.display(), e);
        return ExitCode::FAILURE;
    }
    println!("{}", args.out.display());

    if args.keywords {
        let client = ChatCompletionsClient::new(config.keywords);
        for term in client.suggest(&image).await {
            println!("  {}", term);
        }
    }

    ExitCode::SUCCESS
}
