use clap::Parser;
use secdash_core::Clock;

use crate::Cli;

#[test]
fn default_clock_reads_mexico_city_time() {
    let cli = Cli::try_parse_from(["secdash", "once"]).expect("parse");

    let now = cli.clock().expect("clock").now();

    assert_eq!(now.offset().local_minus_utc(), -6 * 3600);
}

#[test]
fn utc_offset_overrides_timezone() {
    let cli = Cli::try_parse_from(["secdash", "--utc-offset-minutes", "-300", "once"]).expect("parse");

    let now = cli.clock().expect("clock").now();

    assert_eq!(now.offset().local_minus_utc(), -5 * 3600);
}

#[test]
fn unknown_timezone_is_rejected() {
    let cli = Cli::try_parse_from(["secdash", "--timezone", "Mars/Olympus", "once"]).expect("parse");

    assert!(cli.clock().is_err());
}
