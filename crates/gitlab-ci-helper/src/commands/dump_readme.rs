use clap::{Command, CommandFactory};

use crate::commands::Cli;

/// Markdown section per subcommand, sorted by name, built from the CLI definitions.
fn render(command: &Command) -> String {
    let mut subcommands: Vec<_> = command
        .get_subcommands()
        .filter(|subcommand| !matches!(subcommand.get_name(), "dump:readme" | "help"))
        .collect();
    subcommands.sort_by(|a, b| a.get_name().cmp(b.get_name()));

    let mut readme = String::from("## Commands\n");

    for subcommand in subcommands {
        let name = subcommand.get_name();
        let help = subcommand
            .clone()
            .bin_name(format!("{} {name}", command.get_name()))
            .render_long_help()
            .to_string();

        readme.push_str(&format!("\n### {name}\n\n"));

        for line in help.trim_end().lines() {
            let line = format!("    {line}");
            readme.push_str(line.trim_end());
            readme.push('\n');
        }
    }

    readme
}

pub(crate) fn dump_readme() {
    print!("{}", render(&Cli::command()));
}
