use arli_extract::{extract, ExtractError, ExtractorConfig};
use clap::{value_t, App, Arg, ArgMatches};
use log::{error, info};
use std::process;

fn config_from_args(matches: &ArgMatches) -> Result<ExtractorConfig, ExtractError> {
    let input = value_t!(matches, "input", String).map_err(|e| ExtractError::Config(e.message))?;
    let profile = value_t!(matches, "profile", String).map_err(|e| ExtractError::Config(e.message))?;

    let mut config = ExtractorConfig::new(input, profile);
    if matches.is_present("threads") {
        let threads = value_t!(matches, "threads", usize)
            .map_err(|_| ExtractError::Config("number of threads must be a positive integer".to_string()))?;
        config = config.with_threads(threads);
    }
    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = App::new("arli-extract")
        .about("Extracts a routable road network from OpenStreetMap data")
        .arg(
            Arg::with_name("input")
                .help("OSM input file (.osm, .osm.xml or .osm.pbf)")
                .required(true),
        )
        .arg(
            Arg::with_name("profile")
                .short("p")
                .long("profile")
                .takes_value(true)
                .default_value("profile.json")
                .help("Profile used to classify the road network"),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .takes_value(true)
                .help("Number of worker threads, defaults to the number of cores"),
        )
        .get_matches();

    let result = config_from_args(&matches).and_then(|config| extract(&config));
    match result {
        Ok(summary) => {
            info!(
                "Wrote {} edges and {} restrictions using {} threads",
                summary.written.edges, summary.written.restrictions, summary.threads
            );
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
