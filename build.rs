// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: instance name or id
fn instance_arg() -> Arg {
    Arg::new("instance").required(true).help("Instance name or id")
}

/// Common argument: JSON output
fn json_arg() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Output as JSON")
}

/// Common argument: clean source location
fn source_arg() -> Arg {
    Arg::new("source")
        .short('s')
        .long("source")
        .required(true)
        .value_name("DIR")
        .help("Where clean sources live (directory or tarballs)")
}

fn vcs_arg() -> Arg {
    Arg::new("vcs")
        .long("vcs")
        .default_value("src")
        .help("Source kind: src or tarball")
}

fn build_cli() -> Command {
    Command::new("siteward")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fleet manager for web application deployments")
        .subcommand_required(false)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .value_name("PATH")
                .help("Configuration file (default: $SITEWARD_CONFIG, then <config dir>/siteward/config.toml)"),
        )
        .subcommand(Command::new("init").about("Initialize the siteward database"))
        .subcommand(
            Command::new("instance")
                .about("Instance management")
                .subcommand(
                    Command::new("add")
                        .about("Register an instance")
                        .arg(Arg::new("name").required(true).help("Display name, unique"))
                        .arg(Arg::new("web_root").long("web-root").required(true).help("Web root on the host"))
                        .arg(
                            Arg::new("access")
                                .long("access")
                                .default_value("local")
                                .help("How the host is reached: local, ssh or ftp"),
                        )
                        .arg(
                            Arg::new("app")
                                .long("app")
                                .default_value("static")
                                .help("Application kind: static or unmanaged"),
                        )
                        .arg(Arg::new("web_url").long("web-url").help("Public URL of the site"))
                        .arg(Arg::new("temp_dir").long("temp-dir").help("Working directory on the host"))
                        .arg(Arg::new("interpreter").long("interpreter").help("Script interpreter on the host"))
                        .arg(Arg::new("host").long("host").help("Remote host"))
                        .arg(Arg::new("port").long("port").help("Remote port"))
                        .arg(Arg::new("user").long("user").help("Remote user"))
                        .arg(
                            Arg::new("password_env")
                                .long("password-env")
                                .value_name("VAR")
                                .help("Environment variable holding the password"),
                        ),
                )
                .subcommand(Command::new("list").about("List instances").arg(json_arg()))
                .subcommand(
                    Command::new("show")
                        .about("Show one instance")
                        .arg(instance_arg())
                        .arg(json_arg()),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove an instance with its versions and baselines")
                        .arg(instance_arg()),
                )
                .subcommand(
                    Command::new("versions")
                        .about("List the versions recorded for an instance")
                        .arg(instance_arg())
                        .arg(json_arg()),
                ),
        )
        .subcommand(
            Command::new("access").about("Transport checks").subcommand(
                Command::new("check")
                    .about("Connect to an instance's host and report how it authenticated")
                    .arg(instance_arg())
                    .arg(json_arg()),
            ),
        )
        .subcommand(
            Command::new("adopt")
                .about("Record the first version of an instance that is already deployed")
                .arg(instance_arg())
                .arg(Arg::new("branch").required(true).help("Branch or tag the instance is running"))
                .arg(source_arg())
                .arg(vcs_arg())
                .arg(Arg::new("revision").long("revision").help("Revision, if known")),
        )
        .subcommand(
            Command::new("verify")
                .about("Compare the live tree of an instance against its baseline")
                .arg(instance_arg())
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Also list unchanged files"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("update")
                .about("Update an instance to a new branch or tag and reconcile local changes")
                .arg(instance_arg())
                .arg(Arg::new("branch").required(true).help("Branch or tag to move to"))
                .arg(source_arg())
                .arg(vcs_arg())
                .arg(
                    Arg::new("upgrade")
                        .long("upgrade")
                        .action(ArgAction::SetTrue)
                        .help("Record the change as an upgrade rather than an update"),
                )
                .arg(Arg::new("revision").long("revision").help("Revision being installed, if known"))
                .arg(
                    Arg::new("lock")
                        .long("lock")
                        .action(ArgAction::SetTrue)
                        .help("Keep the site in maintenance mode while files change"),
                )
                .arg(json_arg()),
        )
        .subcommand(
            Command::new("lock")
                .about("Put an instance into maintenance mode")
                .arg(instance_arg()),
        )
        .subcommand(
            Command::new("unlock")
                .about("Take an instance out of maintenance mode")
                .arg(instance_arg()),
        )
        .subcommand(
            Command::new("manifest")
                .about("Write a backup manifest for an instance")
                .arg(instance_arg())
                .arg(
                    Arg::new("live")
                        .long("live")
                        .action(ArgAction::SetTrue)
                        .help("Hash the live tree instead of using the stored baseline"),
                )
                .arg(
                    Arg::new("data")
                        .long("data")
                        .value_name("DIR")
                        .action(ArgAction::Append)
                        .help("Auxiliary directory on the host to include as data"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("PATH")
                        .help("Write to a file instead of stdout"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("siteward.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
