mod decoder;
mod source;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use h264_nal::AvcDecoderConfig;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use stream_receiver::{AuOutcome, ReceiverConfig, ReceiverState, StreamReceiver};

use crate::decoder::LoopbackDecoder;
use crate::source::{frame_period, ticks_per_frame, SyntheticSource};

struct Args {
    pool_size: usize,
    frames: u64,
    fps: u32,
    gop: u64,
    loss_every: u64,
    decode_ms: u64,
    avcc: bool,
    verbose: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        pool_size: 4,
        frames: 300,
        fps: 30,
        gop: 30,
        loss_every: 0,
        decode_ms: 20,
        avcc: false,
        verbose: false,
    };

    let argv: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < argv.len() {
        let value = argv.get(i + 1);
        match argv[i].as_str() {
            "--pool-size" | "-n" => {
                args.pool_size = value.and_then(|v| v.parse().ok()).unwrap_or(args.pool_size);
                i += 1;
            }
            "--frames" | "-f" => {
                args.frames = value.and_then(|v| v.parse().ok()).unwrap_or(args.frames);
                i += 1;
            }
            "--fps" => {
                args.fps = value.and_then(|v| v.parse().ok()).unwrap_or(args.fps);
                i += 1;
            }
            "--gop" => {
                args.gop = value.and_then(|v| v.parse().ok()).unwrap_or(args.gop);
                i += 1;
            }
            "--loss-every" => {
                args.loss_every = value.and_then(|v| v.parse().ok()).unwrap_or(args.loss_every);
                i += 1;
            }
            "--decode-ms" => {
                args.decode_ms = value.and_then(|v| v.parse().ok()).unwrap_or(args.decode_ms);
                i += 1;
            }
            "--avcc" => {
                args.avcc = true;
            }
            "--verbose" | "-v" => {
                args.verbose = true;
            }
            "--help" | "-h" => {
                println!("stream-receiver-app - loopback run of the receiver/decoder handoff");
                println!();
                println!("Usage: stream-receiver-app [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --pool-size <N>     Decoder input buffers (default: 4)");
                println!("  -f, --frames <N>        Access units to send (default: 300)");
                println!("      --fps <N>           Frame rate (default: 30)");
                println!("      --gop <N>           Frames between IDRs (default: 30)");
                println!("      --loss-every <N>    Simulate loss every N frames (default: off)");
                println!("      --decode-ms <MS>    Simulated decode time (default: 20)");
                println!("      --avcc              Stage length-prefixed NAL units");
                println!("  -v, --verbose           Enable debug logging");
                println!("  -h, --help              Show this help");
                std::process::exit(0);
            }
            other => {
                eprintln!("ignoring unknown argument {other}");
            }
        }
        i += 1;
    }

    args
}

fn wall_clock_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() {
    let args = parse_args();

    let filter = if args.verbose {
        "stream_receiver=debug,h264_nal=debug,stream_receiver_app=debug"
    } else {
        "stream_receiver=info,h264_nal=info,stream_receiver_app=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    info!(
        pool_size = args.pool_size,
        frames = args.frames,
        fps = args.fps,
        avcc = args.avcc,
        "stream-receiver-app starting"
    );

    let mut source = SyntheticSource::new(args.fps, args.gop, args.loss_every);
    let decoder_config = source.decoder_config();
    let nalu_length_size = args.avcc.then_some(decoder_config.nalu_length_size);
    let (listener, decode_task) = LoopbackDecoder::new(args.pool_size, 4096, nalu_length_size);
    let config = ReceiverConfig {
        replace_start_codes_with_nalu_size: args.avcc,
        ..Default::default()
    };
    let mut receiver = StreamReceiver::new(config, Box::new(listener));

    let (releaser_tx, releaser_rx) = oneshot::channel();
    let decode_time = Duration::from_millis(args.decode_ms);
    let decode_handle = tokio::spawn(decode_task.run(releaser_rx, decode_time));

    // The stream's parameter sets arrive out of band as an avcC record.
    let record = decoder_config.to_record();
    let Some((sps, pps)) = AvcDecoderConfig::parse(&record)
        .ok()
        .and_then(|config| config.first_pair())
    else {
        error!("synthetic decoder configuration is unusable");
        std::process::exit(1);
    };

    match receiver.submit_parameter_sets(Some(sps), Some(pps)) {
        Ok(ReceiverState::Ready) => {}
        Ok(state) => {
            error!(?state, "receiver did not become ready");
            std::process::exit(1);
        }
        Err(e) => {
            error!(%e, "codec configuration failed");
            std::process::exit(1);
        }
    }
    if let Some(releaser) = receiver.releaser() {
        let _ = releaser_tx.send(releaser);
    }

    let ntp_base = wall_clock_us();
    receiver.on_sender_report(ntp_base, u32::MAX - ticks_per_frame(args.fps) * 10);

    let mut ticker = tokio::time::interval(frame_period(args.fps));
    let mut sent = 0;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while sent < args.frames {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("interrupted, halting receiver");
                receiver.halt();
                break;
            }
            _ = ticker.tick() => {
                sent += 1;
                match receiver.submit_access_unit(source.next_au(ntp_base)) {
                    Ok(AuOutcome::Dropped) => warn!(sent, "decoder input buffers exhausted"),
                    Ok(_) => {}
                    Err(e) => {
                        error!(%e, "receiver halted");
                        break;
                    }
                }
            }
        }
    }

    let stats = receiver.stats();
    stats.log();
    drop(receiver);

    match decode_handle.await {
        Ok(summary) => info!(
            decoded = summary.decoded,
            nal_units = summary.nal_units,
            sync_points = summary.sync_points,
            after_loss = summary.after_loss,
            bytes = summary.bytes,
            "decode task finished"
        ),
        Err(e) => error!(%e, "decode task failed"),
    }
}
