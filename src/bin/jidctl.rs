//! A small JID/SRV inspection tool, built on top of `xmppcore`.
use clap::{App, Arg, SubCommand};
use tracing::debug;

use xmppcore::resolver::ResolverSettings;
use xmppcore::Jid;

struct CliOptions {
    debug: bool,
    command: Command,
}

enum Command {
    Parse { wire: String },
    Create { local: Option<String>, domain: String, resource: Option<String> },
    Srv { service: String, proto: String, host: String, port: u16 },
}

impl CliOptions {
    fn options() -> Self {
        let matches = App::new("jidctl")
            .version("0.1")
            .about("Inspect JIDs and SRV-based endpoint discovery")
            .arg(
                Arg::new("debug")
                    .short('g')
                    .long("debug")
                    .required(false)
                    .takes_value(false)
                    .long_help("Enable debug logging"),
            )
            .subcommand(
                SubCommand::with_name("parse")
                    .about("Parse an already-escaped JID wire string")
                    .arg(Arg::new("jid").required(true)),
            )
            .subcommand(
                SubCommand::with_name("create")
                    .about("Construct a JID from unescaped parts, applying PRECIS/IDNA")
                    .arg(Arg::new("local").short('l').long("local").takes_value(true))
                    .arg(Arg::new("domain").short('d').long("domain").required(true).takes_value(true))
                    .arg(Arg::new("resource").short('r').long("resource").takes_value(true)),
            )
            .subcommand(
                SubCommand::with_name("srv")
                    .about("Resolve a host via SRV discovery, falling back to A/AAAA")
                    .arg(Arg::new("service").short('s').long("service").default_value("xmpp-client").takes_value(true))
                    .arg(Arg::new("proto").short('p').long("proto").default_value("tcp").takes_value(true))
                    .arg(Arg::new("host").required(true))
                    .arg(Arg::new("port").short('P').long("port").default_value("5222").takes_value(true)),
            )
            .get_matches();

        let debug = matches.is_present("debug");

        let command = match matches.subcommand() {
            ("parse", Some(sub)) => Command::Parse {
                wire: sub.value_of("jid").unwrap().to_string(),
            },
            ("create", Some(sub)) => Command::Create {
                local: sub.value_of("local").map(String::from),
                domain: sub.value_of("domain").unwrap().to_string(),
                resource: sub.value_of("resource").map(String::from),
            },
            ("srv", Some(sub)) => Command::Srv {
                service: sub.value_of("service").unwrap().to_string(),
                proto: sub.value_of("proto").unwrap().to_string(),
                host: sub.value_of("host").unwrap().to_string(),
                port: sub.value_of("port").unwrap().parse().unwrap_or(5222),
            },
            _ => {
                eprintln!("expected a subcommand: parse | create | srv");
                std::process::exit(2);
            }
        };

        CliOptions { debug, command }
    }
}

#[tokio::main]
async fn main() {
    let options = CliOptions::options();

    let filter = if options.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    debug!(command = ?std::env::args().collect::<Vec<_>>(), "jidctl starting");

    match options.command {
        Command::Parse { wire } => match Jid::parse(&wire) {
            Ok(jid) => {
                println!("jid: {jid}");
                println!("bare: {}", jid.bare());
                let unescaped = jid.unescaped();
                if let Some(local) = &unescaped.local {
                    println!("unescaped local: {local}");
                }
            }
            Err(e) => {
                eprintln!("invalid JID: {e}");
                std::process::exit(1);
            }
        },
        Command::Create { local, domain, resource } => {
            match Jid::create(local.as_deref(), &domain, resource.as_deref()) {
                Ok(jid) => println!("{jid}"),
                Err(e) => {
                    eprintln!("cannot construct JID: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Srv { service, proto, host, port } => {
            let resolver = ResolverSettings::new(service, proto).build_with_system_backend();
            let mut source = resolver.getaddrs(&host, port).await;
            let mut any = false;
            while let Some((v4, v6, port)) = source.next().await {
                any = true;
                println!("candidate: v4={v4:?} v6={v6:?} port={port}");
            }
            if !any {
                eprintln!("no candidates found for {host}");
                std::process::exit(1);
            }
        }
    }
}
