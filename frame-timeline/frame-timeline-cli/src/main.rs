// Copyright 2020-2023 Andrew D. Straw.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT
// or http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::{io::IsTerminal, path::PathBuf};

use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use tracing::debug;

use frame_timeline::{scan, CacheDestination, KeywordFilter, ScanConfig, TimeWindow};

mod render;

use render::Layout;

const DEFAULT_LOG_DIRECTIVES: &str = "frame_timeline=info,warn";

#[derive(Debug, Parser)]
#[command(version, about)]
struct Opt {
    /// Root of the data tree, containing one `YYYYMMDD` directory per day.
    root: PathBuf,

    /// Window start, as `UTYYYYMMDDTHH[:MM[:SS]]` or seconds since the epoch.
    tstart: String,

    /// Window end, in the same format as TSTART.
    tend: String,

    /// Track the values of header keywords matching the regular expression
    /// PATTERN, optionally only in stream STREAM.
    #[arg(short, long, value_name = "[STREAM:]PATTERN")]
    keyword: Option<String>,

    /// Write new cache files next to the frame files instead of below the
    /// local cache root.
    #[arg(long)]
    export_cache: bool,

    /// Terminal width in characters. Taken from COLUMNS if that is exported,
    /// as the terminal itself is not queried.
    #[arg(long, env = "COLUMNS", default_value_t = 80)]
    width: usize,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not color the timeline.
    #[arg(long)]
    no_color: bool,

    /// Print the aggregates as YAML instead of drawing the timeline.
    #[arg(long)]
    yaml: bool,

    /// Also write log messages to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    let _guard = env_tracing_logger::initiate_logging(
        opt.log_file.clone(),
        Some(DEFAULT_LOG_DIRECTIVES),
        false,
    )
    .map_err(|e| eyre::eyre!("could not start logging: {e}"))?;
    run(&opt)
}

fn load_config(opt: &Opt) -> eyre::Result<ScanConfig> {
    let mut cfg = match &opt.config {
        Some(path) => ScanConfig::from_path(path)
            .with_context(|| format!("while loading configuration {}", path.display()))?,
        None => ScanConfig::default(),
    };
    if opt.export_cache {
        cfg.cache_destination = CacheDestination::Export;
    }
    Ok(cfg)
}

fn run(opt: &Opt) -> eyre::Result<()> {
    let cfg = load_config(opt)?;
    let window = TimeWindow::parse(&opt.tstart, &opt.tend)?;
    let filter = opt
        .keyword
        .as_deref()
        .map(KeywordFilter::parse)
        .transpose()?;

    // Bin for the narrowest labels first, then refit once the stream names
    // and counts are known.
    let num_bins = Layout::new(&[], opt.width).timeline_width;
    let mut out = scan(&opt.root, cfg, window, num_bins, filter)
        .with_context(|| format!("while scanning {}", opt.root.display()))?;
    let layout = Layout::new(&out.streams, opt.width);
    if layout.timeline_width != num_bins {
        debug!("rebinning to {} bins", layout.timeline_width);
        out.rebin(layout.timeline_width)?;
    }

    if opt.yaml {
        print!("{}", serde_yaml::to_string(&out)?);
    } else {
        let color = !opt.no_color && std::io::stdout().is_terminal();
        print!("{}", render::render(&out, &layout, color));
    }
    Ok(())
}
