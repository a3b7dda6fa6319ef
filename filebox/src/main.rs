use std::path::PathBuf;

use clap::{arg, command, crate_name, value_parser, ArgAction, ArgMatches, Command};
use cli::client::Account;

mod cli;

const DEFAULT_URI: &str = "http://localhost:3000";

#[tokio::main]
async fn main() {
    let cli = command!(crate_name!())
        .version(clap::crate_version!())
        .about(clap::crate_description!())
        .subcommand(Command::new(cli::VERSION_SUBCOMMAND).about(cli::VERSION_DESCRIPTION))
        .subcommand(Command::new(cli::BUGREPORT_SUBCOMMAND).about(cli::BUGREPORT_DESCRIPTION))
        .subcommand(Command::new(cli::SERVER_SUBCOMMAND).about(cli::SERVER_DESCRIPTION))
        .subcommand(
            with_account(Command::new(cli::UPLOAD_SUBCOMMAND))
                .about(cli::UPLOAD_DESCRIPTION)
                .arg(
                    arg!(-f --file <FILE>)
                        .required(true)
                        .action(ArgAction::Append)
                        .value_parser(value_parser!(PathBuf))
                        .help("Path to file to upload. Repeat to upload several files"),
                )
                .arg(
                    arg!(--folder <FOLDER>)
                        .required(false)
                        .help("Folder label for uploaded files"),
                ),
        )
        .subcommand(with_account(Command::new(cli::LIST_SUBCOMMAND)).about(cli::LIST_DESCRIPTION))
        .subcommand(
            with_account(Command::new(cli::DOWNLOAD_SUBCOMMAND))
                .about(cli::DOWNLOAD_DESCRIPTION)
                .arg(file_id())
                .arg(
                    arg!(-o --output <DIR>)
                        .required(false)
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to save file into"),
                ),
        )
        .subcommand(
            with_account(Command::new(cli::DELETE_SUBCOMMAND))
                .about(cli::DELETE_DESCRIPTION)
                .arg(file_id()),
        )
        .subcommand(
            with_account(Command::new(cli::FOLDER_SUBCOMMAND))
                .about(cli::FOLDER_DESCRIPTION)
                .arg(arg!(<NAME> "Folder name").required(true)),
        )
        .arg_required_else_help(true)
        .disable_version_flag(true)
        .get_matches();

    match cli.subcommand() {
        Some((cli::VERSION_SUBCOMMAND, _)) => cli::version::run(),
        Some((cli::BUGREPORT_SUBCOMMAND, _)) => cli::bugreport::run(),
        Some((cli::SERVER_SUBCOMMAND, _)) => cli::server::run().await,
        Some((cli::UPLOAD_SUBCOMMAND, m)) => {
            let files: Vec<PathBuf> = m
                .get_many::<PathBuf>("file")
                .map(|v| v.cloned().collect())
                .unwrap_or_default();
            let folder = m.get_one::<String>("folder").map(String::as_str);
            cli::client::upload(&account(m), &files, folder).await;
        }
        Some((cli::LIST_SUBCOMMAND, m)) => cli::client::list(&account(m)).await,
        Some((cli::DOWNLOAD_SUBCOMMAND, m)) => {
            let dir = m
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("."));
            cli::client::download(&account(m), id(m), &dir).await;
        }
        Some((cli::DELETE_SUBCOMMAND, m)) => cli::client::delete(&account(m), id(m)).await,
        Some((cli::FOLDER_SUBCOMMAND, m)) => {
            let name = m.get_one::<String>("NAME").map_or("", String::as_str);
            cli::client::create_folder(&account(m), name).await;
        }
        _ => {}
    }
}

fn with_account(cmd: Command) -> Command {
    cmd.arg(
        arg!(-u --uri <URI>)
            .required(false)
            .default_value(DEFAULT_URI)
            .help("Filebox URI"),
    )
    .arg(arg!(-e --email <EMAIL>).required(true).help("Account email"))
    .arg(
        arg!(-p --password <PASSWORD>)
            .required(true)
            .help("Account password"),
    )
}

fn file_id() -> clap::Arg {
    arg!(-i --id <ID>)
        .required(true)
        .value_parser(value_parser!(i64))
        .help("File id")
}

fn account(m: &ArgMatches) -> Account {
    let value = |name: &str| m.get_one::<String>(name).cloned().unwrap_or_default();
    Account {
        uri: value("uri"),
        email: value("email"),
        password: value("password"),
    }
}

fn id(m: &ArgMatches) -> i64 {
    m.get_one::<i64>("id").copied().unwrap_or_default()
}
