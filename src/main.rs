extern crate chrono;
extern crate clap;
extern crate directip;
extern crate env_logger;
extern crate eucaws;
extern crate failure;
extern crate hex;
extern crate listenfd;
#[macro_use]
extern crate log;
#[macro_use]
extern crate prettytable;
extern crate receiver;
extern crate serde_json;
extern crate walkdir;

use chrono::{DateTime, Utc};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use directip::Message;
use eucaws::{Confidence, Observation};
use failure::Error;
use listenfd::ListenFd;
use log::LevelFilter;
use prettytable::{format, Table};
use receiver::{Config, Record, Server, Status};
use std::ffi::OsStr;
use std::{env, fs, process};

fn main() {
    let matches = App::new("valentia")
        .about("receive and decode EUCAWS observations sent over Iridium DirectIP")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .global(true)
                .help("log debug messages"),
        )
        .subcommand(
            SubCommand::with_name("serve")
                .about("receive DirectIP sessions")
                .arg(
                    Arg::with_name("CONFIG")
                        .help("the path to the configuration toml file")
                        .index(1),
                )
                .arg(
                    Arg::with_name("bind")
                        .long("bind")
                        .takes_value(true)
                        .help("the address to listen on, overriding the configuration"),
                ),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("decode a Format #100 payload")
                .arg(
                    Arg::with_name("HEX")
                        .help("the payload as a hex string")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("session-time")
                        .long("session-time")
                        .takes_value(true)
                        .help("the time of session, for payloads without a full timestamp"),
                )
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("print json instead of a table"),
                ),
        )
        .subcommand(
            SubCommand::with_name("parse")
                .about("parse a DirectIP session file")
                .arg(
                    Arg::with_name("FILE")
                        .help("the path to the session file")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("reprocess")
                .about("decode every stored session again")
                .arg(
                    Arg::with_name("ROOT")
                        .help("the root directory of the session store")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("dry-run")
                        .long("dry-run")
                        .help("print what would change without writing anything"),
                ),
        )
        .get_matches();

    init_logger(matches.is_present("verbose"));

    let result = match matches.subcommand() {
        ("serve", Some(matches)) => serve(matches),
        ("decode", Some(matches)) => decode(matches),
        ("parse", Some(matches)) => parse(matches),
        ("reprocess", Some(matches)) => reprocess(matches),
        _ => unreachable!(),
    };
    if let Err(err) = result {
        eprintln!("error: {}", err);
        for cause in err.iter_causes() {
            eprintln!("  caused by: {}", cause);
        }
        process::exit(1);
    }
}

fn init_logger(verbose: bool) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse(&filters);
    }
    builder.init();
}

fn serve(matches: &ArgMatches) -> Result<(), Error> {
    let mut config = match matches.value_of("CONFIG") {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(bind) = matches.value_of("bind") {
        config.bind = bind.to_string();
    }
    let dispatcher = config.dispatcher()?;
    let mut listenfd = ListenFd::from_env();
    let server = if let Some(listener) = listenfd.take_tcp_listener(0)? {
        info!("using listener from the environment");
        Server::from_listener(listener, &config, dispatcher)
    } else {
        Server::bind(config.bind.as_str(), &config, dispatcher)?
    };
    server.run()?;
    Ok(())
}

fn decode(matches: &ArgMatches) -> Result<(), Error> {
    let bytes = hex::decode(matches.value_of("HEX").unwrap_or_default())?;
    let session_time = match matches.value_of("session-time") {
        Some(s) => Some(s.parse::<DateTime<Utc>>()?),
        None => None,
    };
    let observation = eucaws::decode(&bytes, session_time)?;
    if matches.is_present("json") {
        println!("{}", serde_json::to_string_pretty(&observation)?);
    } else {
        print_observation(&observation);
    }
    Ok(())
}

fn print_observation(observation: &Observation) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_BORDER_LINE_SEPARATOR);
    table.set_titles(row!["Name", "Raw", "Value", "Unit"]);
    for reading in &observation.readings {
        let value = reading
            .value
            .map(|value| format!("{:.2}", value))
            .unwrap_or_else(|| "n/a".to_string());
        table.add_row(row![reading.name, r->reading.raw, r->value, reading.unit]);
    }
    table.printstd();

    let timestamp = observation
        .timestamp
        .map(|timestamp| timestamp.to_rfc3339())
        .unwrap_or_else(|| "n/a".to_string());
    println!();
    println!(
        "Timestamp: {} ({:?})",
        timestamp, observation.timestamp_source
    );
    match observation.confidence {
        Confidence::Nominal => println!("Confidence: nominal"),
        Confidence::Low(ref reasons) => {
            println!("Confidence: low");
            for reason in reasons {
                println!("  - {}", reason);
            }
        }
    }
}

fn parse(matches: &ArgMatches) -> Result<(), Error> {
    let bytes = fs::read(matches.value_of("FILE").unwrap_or_default())?;
    let message = Message::parse(&bytes)?;
    let metadata = message.metadata();
    let status = Status::new(message.payload(), Some(metadata.header.time_of_session));
    let record = Record::new(metadata, message.payload(), &status);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn reprocess(matches: &ArgMatches) -> Result<(), Error> {
    use walkdir::WalkDir;

    let root = matches.value_of("ROOT").unwrap_or_default();
    let dry_run = matches.is_present("dry-run");
    let mut count = 0;
    let mut failed = 0;
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension() != Some(OsStr::new("json")) {
            continue;
        }
        match Record::from_path(path).and_then(Record::reprocess) {
            Ok(record) => {
                if dry_run {
                    println!("{} {}", path.display(), record.status);
                } else {
                    record.write_to_path(path)?;
                    debug!("{}: {}", path.display(), record.status);
                }
                count += 1;
            }
            Err(err) => {
                warn!("{}: {}", path.display(), err);
                failed += 1;
            }
        }
    }
    info!("reprocessed {} records, {} failed", count, failed);
    Ok(())
}
