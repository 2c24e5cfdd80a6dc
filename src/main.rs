use clap::{App, Arg, ArgMatches, SubCommand};
use std::path::Path;

use wikilanguage::pipelines;
use wikilanguage::rank::kl::KlKind;
use wikilanguage::settings::Settings;

/// Fetch an argument clap should have enforced, as a proper error rather
/// than a panic.
fn arg_value<'a>(
    matches: &'a ArgMatches,
    name: &str,
) -> Result<&'a str, Box<dyn std::error::Error>> {
    match matches.value_of(name) {
        Some(value) => Ok(value),
        None => Err(format!("Missing required argument '{}'", name).into()),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let matches = App::new("wikilanguage")
        .about("Joins Wikidata concepts with per-language Wikipedia PageRank.")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .default_value("config.toml")
                .help("Settings file"),
        )
        .subcommand(SubCommand::with_name("run").about("Run the full batch pipeline"))
        .subcommand(
            SubCommand::with_name("kl")
                .about("Rank concept divergence between two built wikis")
                .arg(
                    Arg::with_name("base")
                        .long("base")
                        .takes_value(true)
                        .required(true)
                        .help("Base wiki name, e.g. enwiki"),
                )
                .arg(
                    Arg::with_name("target")
                        .long("target")
                        .takes_value(true)
                        .required(true)
                        .help("Target wiki name, e.g. jawiki"),
                )
                .arg(
                    Arg::with_name("kind")
                        .long("kind")
                        .takes_value(true)
                        .default_value("forward")
                        .possible_values(&["forward", "backward", "jsd"])
                        .help("Divergence to rank by"),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .required(true)
                        .help("Output TSV path"),
                ),
        )
        .get_matches();

    let settings = Settings::new(arg_value(&matches, "config")?)?;

    if matches.subcommand_matches("run").is_some() {
        pipelines::run(&settings)?;
    } else if let Some(matches) = matches.subcommand_matches("kl") {
        let kind_name = arg_value(matches, "kind")?;
        let kind = KlKind::from_name(kind_name)
            .ok_or_else(|| format!("Unknown divergence kind '{}'", kind_name))?;
        pipelines::kl_report(
            &settings,
            arg_value(matches, "base")?,
            arg_value(matches, "target")?,
            kind,
            Path::new(arg_value(matches, "output")?),
        )?;
    } else {
        println!("{}", matches.usage());
    }
    Ok(())
}
