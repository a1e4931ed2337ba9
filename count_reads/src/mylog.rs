//
// Copyright (c) 2017 10x Genomics, Inc. All rights reserved.
//

// Timestamped logger

use chrono::Local;
use log::LevelFilter;
use std::io::Write;

/// Log at info, or debug with `verbose`. `RUST_LOG` overrides either.
pub fn init_log(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(level)
        .parse_default_env()
        .try_init();
}
