use anyhow::Result;
use clipq::process::ClipConfig;
use clipq::process::scan::{StreamScan, scan_stream};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::time_str;
use crate::vorbis::VorbisCodec;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing Ogg Vorbis stream: {}", args.input.display());

    let mut input_reader = InputReader::new(&args.input)?;

    let mut config = ClipConfig::default();
    config.set_fail_level(cli.fail_level());
    if input_reader.is_pipe() {
        config.set_read_chunk(64 * 1024);
    }

    let pb = match multi {
        Some(multi) => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Scanning pages...");
            Some(pb)
        }
        None => None,
    };

    let scan = scan_stream(&mut input_reader, VorbisCodec::boxed(), &config);

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    print_summary(&scan?);
    Ok(())
}

fn print_summary(scan: &StreamScan) {
    println!("Stream Information");
    println!("  Serial number             {:#010X}", scan.serial);
    println!("  Channels                  {}", scan.info.channels);
    println!("  Sample rate               {} Hz", scan.info.sample_rate);
    if let Some(vendor) = &scan.info.vendor {
        println!("  Vendor                    {vendor}");
    }
    for comment in &scan.info.comments {
        println!("  Comment                   {comment}");
    }
    println!();

    println!("Analysis Summary");
    println!("  Pages                     {}", scan.pages);
    if scan.foreign_pages > 0 {
        println!("  Pages of other streams    {}", scan.foreign_pages);
    }
    println!("  Packets                   {}", scan.packets);
    println!("  Holes                     {}", scan.holes);
    println!(
        "  End of stream             {}",
        if scan.eos { "yes" } else { "missing" }
    );

    let size_kb = scan.bytes as f64 / 1000.0;
    println!("  Size                      {size_kb:.2} kB ({} bytes)", scan.bytes);

    if let Some(duration_secs) = scan.duration_secs() {
        println!("  Duration                  {}", time_str(duration_secs));
        let avg_data_rate_kbps = (scan.bytes as f64 * 8.0) / (duration_secs * 1000.0);
        println!("  Average data rate         {avg_data_rate_kbps:.1} kbps");
    }

    println!();
}
