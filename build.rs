//! Build script rendering the `replika` man pages.
//!
//! One page is written for the binary and one per subcommand
//! (`replika-copy.1`), all into the build output directory.

use std::env;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render_page(out_dir: &Path, man: &Man, page: &str) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    File::create(out_dir.join(format!("{page}.1")))?.write_all(&buffer)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs", "Cargo.toml"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let command = Cli::command();
    let binary = command.get_name().to_owned();
    for subcommand in command.get_subcommands() {
        let page = format!("{binary}-{}", subcommand.get_name());
        let man = Man::new(subcommand.clone()).title(page.clone());
        render_page(&out_dir, &man, &page)?;
    }
    render_page(&out_dir, &Man::new(command), &binary)?;

    Ok(())
}
