use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use beacon_live::session::{BridgeState, ProfileCell, Voice};
use beacon_live::voice::{
    AmplitudeSnapshot, AmplitudeTap, AudioFrame, CaptureHandle, INPUT_SAMPLE_RATE,
    OUTPUT_SAMPLE_RATE, PlaybackEngine, samples_to_wav,
};
use beacon_live::{
    BridgeEvent, Config, ConnectRequest, CpalBackend, GeminiLiveTransport, SessionBridge,
};

/// Beacon Live - Realtime voice sessions with an AI assistant
#[derive(Parser)]
#[command(name = "beacon-live", version, about)]
struct Cli {
    /// Voice to use (e.g., "Kore"); overrides config
    #[arg(long, env = "BEACON_LIVE_VOICE")]
    voice: Option<Voice>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// List available voices
    Voices,
}

type Bridge = SessionBridge<GeminiLiveTransport, CpalBackend>;

// Audio device streams are not `Send`, so everything runs on one thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,beacon_live=info",
        1 => "info,beacon_live=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, output } => test_mic(duration, output.as_deref()).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Voices => {
                for voice in Voice::ALL {
                    println!("{voice}");
                }
                Ok(())
            }
        };
    }

    let mut config = Config::load()?;
    if let Some(voice) = cli.voice {
        config.voice.voice = voice;
    }
    tracing::debug!(?config, "loaded configuration");

    interactive(config).await
}

/// Interactive session driven by lines on stdin
#[allow(clippy::future_not_send)]
async fn interactive(config: Config) -> anyhow::Result<()> {
    let profile = ProfileCell::new(config.profile());
    let mut bridge: Bridge = SessionBridge::new(config.transport(), CpalBackend::new())
        .with_output_gain(config.voice.output_gain);

    let mut status = bridge.subscribe();
    let input_levels = bridge.input_levels();
    let output_levels = bridge.output_levels();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut meter = tokio::time::interval(Duration::from_secs(1));

    tracing::info!(voice = %profile.get().voice, "beacon live ready");
    print_help();

    loop {
        tokio::select! {
            event = bridge.next_event() => report_event(&event),
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_command(line.trim(), &mut bridge, &profile, &config) {
                    break;
                }
            }
            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                println!("status: {current}");
            }
            _ = meter.tick() => {
                if bridge.state() == BridgeState::Open {
                    let input = *input_levels.borrow();
                    let output = *output_levels.borrow();
                    tracing::debug!(input = input.level, output = output.level, "levels");
                }
            }
        }
    }

    bridge.disconnect();
    tracing::info!("beacon live stopped");
    Ok(())
}

/// Apply one command line; returns `false` to quit
fn handle_command(line: &str, bridge: &mut Bridge, profile: &ProfileCell, config: &Config) -> bool {
    let (command, arg) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, a)| (c, a.trim()));

    match command {
        "" => {}
        "connect" => {
            let request = ConnectRequest::new(config.credential(), profile.get());
            if let Err(e) = bridge.connect(request) {
                println!("{}", e.status_message());
            }
        }
        "disconnect" => bridge.disconnect(),
        "voice" => match arg.parse::<Voice>() {
            Ok(voice) => {
                profile.set_voice(voice);
                println!("voice: {voice}");
                restart_notice(bridge);
            }
            Err(e) => println!("{e}"),
        },
        "persona" => {
            profile.set_persona(arg);
            println!("persona updated");
            restart_notice(bridge);
        }
        "status" => {
            println!("status: {}", bridge.status());
            println!("voice: {}", profile.get().voice);
        }
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => println!("unknown command: {other} (try \"help\")"),
    }

    true
}

/// Profile changes only take effect on the next connect
fn restart_notice(bridge: &mut Bridge) {
    if bridge.state().is_active() {
        bridge.disconnect();
        println!("session closed; run \"connect\" to continue with the new settings");
    }
}

fn report_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::Opened => println!("connected - start talking"),
        BridgeEvent::AudioScheduled(handle) => {
            tracing::trace!(handle = handle.id(), "audio scheduled");
        }
        BridgeEvent::Interrupted { stopped } => {
            tracing::debug!(stopped, "playback interrupted");
        }
        BridgeEvent::Closed => println!("session ended"),
        BridgeEvent::Failed(message) => println!("{message}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  connect            open a session");
    println!("  disconnect         close the session");
    println!("  voice <name>       change voice (see `beacon-live voices`)");
    println!("  persona <text>     change the system instruction");
    println!("  status             show connection status");
    println!("  quit               exit");
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let recorded = Arc::new(Mutex::new(Vec::<f32>::new()));
    let sink = {
        let recorded = Arc::clone(&recorded);
        move |frame: AudioFrame| {
            if let (Ok(samples), Ok(mut all)) = (frame.to_samples(), recorded.lock()) {
                all.extend(samples);
            }
        }
    };

    let tap = AmplitudeTap::new();
    let mut capture = CaptureHandle::start(&CpalBackend::new(), tap.clone(), sink)?;

    println!("Sample rate: {INPUT_SAMPLE_RATE} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let AmplitudeSnapshot { rms, peak, level } = tap.latest();

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (level * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {rms:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    capture.stop();

    if let Some(path) = output {
        let samples = recorded
            .lock()
            .map(|s| s.clone())
            .map_err(|_| anyhow::anyhow!("recording buffer poisoned"))?;
        let wav = samples_to_wav(&samples, INPUT_SAMPLE_RATE)?;
        std::fs::write(path, wav)?;
        println!("\nWrote {} samples to {}", samples.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave through the playback scheduler
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = PlaybackEngine::start(&CpalBackend::new(), AmplitudeTap::new(), 1.0)?;

    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (OUTPUT_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / OUTPUT_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {OUTPUT_SAMPLE_RATE} Hz...", samples.len());

    let frame = AudioFrame::from_samples(&samples, OUTPUT_SAMPLE_RATE);
    playback.enqueue(&frame)?;
    tokio::time::sleep(Duration::from_secs_f64(frame.duration_secs() + 0.25)).await;
    playback.close();

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}
