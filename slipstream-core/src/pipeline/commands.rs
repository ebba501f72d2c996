//! Command-line construction for each pipeline stage.
//!
//! Every argument is passed explicitly; nothing goes through a shell. The
//! relay/publisher/subscriber flag vocabulary belongs to the external
//! binaries and is reproduced here verbatim.

use std::path::Path;

use crate::config::{HarnessConfig, RelayLaunch};
use crate::supervisor::CommandSpec;

use super::{Stage, SubscriberPaths};

/// Builds the SSH invocation that starts the relay server on a remote host.
pub fn relay_command(config: &HarnessConfig, launch: &RelayLaunch) -> CommandSpec {
    CommandSpec::new(Stage::Relay.to_string(), &config.programs.ssh)
        .arg(&launch.ssh_target)
        .arg(launch.relay_bin.display().to_string())
        .arg("-port")
        .arg(config.relay.port.to_string())
        .arg("-cert")
        .arg(launch.cert.display().to_string())
        .arg("-key")
        .arg(launch.key.display().to_string())
        .arg("-endpoint")
        .arg(&config.relay.endpoint)
        .arg("--logging")
        .arg(config.pipeline.client_logging.client_flag())
}

/// Builds the ffmpeg invocation that generates the test stream into the pipe.
///
/// Two `lavfi` inputs (SMPTE bars and a sine tone) are encoded to H.264
/// baseline + AAC and muxed as FLV. A `drawtext` overlay stamps each frame
/// with the local wall-clock time and frame number so captured outputs can
/// be compared against real time.
pub fn media_source_command(config: &HarnessConfig, pipe: &Path) -> CommandSpec {
    let media = &config.media;
    let duration = media.duration.as_secs();
    let keyint = media.keyframe_interval.to_string();

    let overlay = format!(
        "drawtext=fontfile={}: text='Local time %{{localtime\\: %Y/%m/%d %H.%M.%S}} (%{{n}})': \
         x=10: y=10: fontsize=16: fontcolor=white: box=1: boxcolor=0x00000099",
        media.font_file.display()
    );

    CommandSpec::new(Stage::MediaSource.to_string(), &config.programs.ffmpeg)
        .arg("-y")
        .args(["-f", "lavfi", "-re", "-i"])
        .arg(format!(
            "smptebars=duration={duration}:size={}:rate={}",
            media.resolution, media.frame_rate
        ))
        .args(["-f", "lavfi", "-re", "-i"])
        .arg(format!(
            "sine=frequency={}:duration={duration}:sample_rate={}",
            media.tone_frequency, media.sample_rate
        ))
        .args(["-pix_fmt", "yuv420p"])
        .args(["-c:v", "libx264", "-b:v", media.video_bitrate])
        .arg("-g")
        .arg(&keyint)
        .arg("-keyint_min")
        .arg(&keyint)
        .args(["-profile:v", "baseline", "-preset", "veryfast"])
        .args(["-c:a", "aac", "-b:a", media.audio_bitrate])
        .arg("-vf")
        .arg(overlay)
        .args(["-f", "flv"])
        .arg(pipe.display().to_string())
}

/// Builds the publisher invocation: read the pipe, stream to the relay.
pub fn publisher_command(config: &HarnessConfig, pipe: &Path) -> CommandSpec {
    CommandSpec::new(Stage::Publisher.to_string(), &config.programs.publisher)
        .arg("-input_flv_file")
        .arg(pipe.display().to_string())
        .arg("-connect_url")
        .arg(config.relay.connect_url())
        .arg("--logging")
        .arg(config.pipeline.client_logging.client_flag())
}

/// Builds one subscriber invocation: capture the relayed stream to the
/// entry's output file, stats to its log file.
pub fn subscriber_command(config: &HarnessConfig, entry: &SubscriberPaths) -> CommandSpec {
    CommandSpec::new(
        Stage::Subscriber(entry.index).to_string(),
        &config.programs.subscriber,
    )
    .arg("-connect_url")
    .arg(config.relay.connect_url())
    .arg("--flv_outpath")
    .arg(entry.output.display().to_string())
    .arg("-stats_log_file")
    .arg(entry.stats_log.display().to_string())
    .arg("--logging")
    .arg(config.pipeline.client_logging.client_flag())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_relay_command_shape() {
        let mut config = HarnessConfig::default();
        config.relay.host = "192.168.221.128".to_string();
        let launch = RelayLaunch::new("user@192.168.221.128");

        let spec = relay_command(&config, &launch);

        assert_eq!(spec.label, "relay");
        assert_eq!(spec.program, config.programs.ssh);
        assert_eq!(spec.args[0], "user@192.168.221.128");
        assert!(spec.args.contains(&"-port".to_string()));
        assert!(spec.args.contains(&"4433".to_string()));
        assert!(spec.args.contains(&"-endpoint".to_string()));
        assert!(spec.args.contains(&"/moq".to_string()));
        assert_eq!(spec.args.last().unwrap(), "DBG1");
    }

    #[test]
    fn test_media_source_command_shape() {
        let config = HarnessConfig::default();
        let pipe = Path::new("/tmp/fifo.flv");

        let spec = media_source_command(&config, pipe);

        assert_eq!(spec.label, "media-source");
        assert_eq!(spec.args[0], "-y");
        assert!(
            spec.args
                .iter()
                .any(|a| a.starts_with("smptebars=duration=300:size=320x200:rate=30"))
        );
        assert!(
            spec.args
                .iter()
                .any(|a| a.starts_with("sine=frequency=1000:duration=300"))
        );
        assert!(spec.args.iter().any(|a| a.contains("drawtext=fontfile=")));
        assert!(spec.args.iter().any(|a| a.contains("%{localtime")));
        // The pipe is the output, always last
        assert_eq!(spec.args.last().unwrap(), "/tmp/fifo.flv");
    }

    #[test]
    fn test_publisher_command_shape() {
        let config = HarnessConfig::default();
        let pipe = Path::new("/tmp/fifo.flv");

        let spec = publisher_command(&config, pipe);

        assert_eq!(spec.label, "publisher");
        assert_eq!(
            spec.args,
            vec![
                "-input_flv_file",
                "/tmp/fifo.flv",
                "-connect_url",
                "https://127.0.0.1:4433/moq",
                "--logging",
                "DBG1",
            ]
        );
    }

    #[test]
    fn test_subscriber_command_embeds_per_index_paths() {
        let config = HarnessConfig::default();
        let entry = SubscriberPaths {
            index: 7,
            output: PathBuf::from("/tmp/out/moq-out-7.flv"),
            stats_log: PathBuf::from("/tmp/logs/client-7.log"),
        };

        let spec = subscriber_command(&config, &entry);

        assert_eq!(spec.label, "subscriber-7");
        assert!(spec.args.contains(&"/tmp/out/moq-out-7.flv".to_string()));
        assert!(spec.args.contains(&"/tmp/logs/client-7.log".to_string()));
    }
}
