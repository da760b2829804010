use std::collections::HashMap as Map;

use structopt::StructOpt;

mod command;
mod server;

use crate::command::{Command, Execution};
use crate::server::Server;

#[derive(StructOpt)]
#[structopt(name = "ring-harness")]
struct Opt {
    /// Path to the ring-peer binary
    #[structopt(short = "s", long = "server", parse(from_os_str))]
    server: std::path::PathBuf,

    /// JSON execution script
    #[structopt(short = "f", long = "file", parse(from_os_str))]
    file: std::path::PathBuf,

    /// Base port passed to every member
    #[structopt(short = "p", long = "port", default_value = "5000")]
    port: u16,

    /// Verbosity passed to every member
    #[structopt(short = "v", parse(from_occurrences))]
    verbose: u8,
}

fn main() {
    let opt = Opt::from_args();

    let execution: Execution = std::fs::File::open(&opt.file)
        .map(std::io::BufReader::new)
        .map(serde_json::from_reader)
        .expect("[HARNESS ERROR]: could not find file")
        .expect("[HARNESS ERROR]: could not parse execution");

    // Running members, killed on drop
    let mut servers: Map<usize, Server> = Map::default();

    for command in execution.0 {
        println!("Executing command {:?}", command);
        match command {
        | Command::Start { id, count } => {
            let server = Server::new(&opt.server, id, count, opt.port, opt.verbose)
                .expect("[HARNESS ERROR]: could not spawn member");
            // Replacing a running member kills the old process
            servers.insert(id, server);
        }
        | Command::Crash { id } => {
            servers.remove(&id);
        }
        | Command::Sleep { ms } => {
            std::thread::sleep(std::time::Duration::from_millis(ms))
        }
        }
    }
}
