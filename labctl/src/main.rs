use std::process::exit;
use std::time::Duration;

use clap::{crate_authors, crate_version, App as ClapApp, Arg};
use tokio::runtime::Runtime;

use env_logger::Env;
use labctl::transport::serial::list_ports;
use labctl::{Address, Connection};

fn main() {
    let matches = ClapApp::new("labctl")
        .author(crate_authors!())
        .version(crate_version!())
        .about("Probe bench instruments from the command line")
        .arg(
            Arg::new("list")
                .long("list")
                .short('l')
                .help("List the serial ports on this system"),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .takes_value(true)
                .help("Instrument address, e.g. serial::/dev/ttyUSB0::9600::8N1"),
        )
        .arg(
            Arg::new("query")
                .long("query")
                .short('q')
                .takes_value(true)
                .default_value("*IDN?")
                .help("Command to send; a reply is read if it ends in '?'"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .takes_value(true)
                .default_value("2000")
                .help("Reply timeout in milliseconds"),
        )
        .arg(Arg::new("verbose").long("verbose").short('v').help("Log verbose output"))
        .get_matches();

    if matches.is_present("verbose") {
        env_logger::Builder::from_env(Env::default().default_filter_or("labctl=debug")).init();
    } else {
        env_logger::init();
    }

    let rt = Runtime::new().expect("failed to start tokio runtime");
    rt.block_on(async move {
        if matches.is_present("list") {
            match list_ports().await {
                Ok(ports) => {
                    for port in ports {
                        println!("{}", port);
                    }
                }
                Err(err) => {
                    eprintln!("cannot list serial ports: {}", err);
                    exit(1);
                }
            }
            return;
        }

        let addr = match matches.value_of("address") {
            Some(x) => x,
            None => {
                eprintln!("either --list or --address is required");
                exit(1);
            }
        };
        let addr = match Address::parse(addr) {
            Ok(x) => x,
            Err(err) => {
                eprintln!("{}", err);
                exit(1);
            }
        };
        let timeout: u64 = match matches.value_of("timeout").unwrap().parse() {
            Ok(x) => x,
            Err(_) => {
                eprintln!("cannot parse timeout");
                exit(1);
            }
        };

        let query = matches.value_of("query").unwrap();
        let result = async {
            let mut conn = Connection::open(&addr)
                .await?
                .timeout(Duration::from_millis(timeout));
            if query.contains('?') {
                conn.ask(query).await
            } else {
                conn.write(query).await.map(|_| String::new())
            }
        }
        .await;

        match result {
            Ok(reply) => {
                if !reply.is_empty() {
                    println!("{}", reply);
                }
            }
            Err(err) => {
                eprintln!("{}", err);
                exit(1);
            }
        }
    });
}
