use std::fs;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;

// cli.rs only depends on clap and clap_complete, both build-dependencies.
#[path = "src/cli.rs"]
mod cli;

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let Some(out_dir) = std::env::var_os("OUT_DIR").map(PathBuf::from) else {
        panic!("OUT_DIR not set by Cargo");
    };
    let mut cmd = cli::Cli::command();

    let man_dir = out_dir.join("man");
    create_dir(&man_dir);
    write_manpages(&cmd, "vouchly", &man_dir);

    let completions_dir = out_dir.join("completions");
    create_dir(&completions_dir);
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        if let Err(e) = clap_complete::generate_to(shell, &mut cmd, "vouchly", &completions_dir) {
            panic!("failed to write {shell} completions: {e}");
        }
    }
}

fn create_dir(dir: &Path) {
    if let Err(e) = fs::create_dir_all(dir) {
        panic!("failed to create {}: {e}", dir.display());
    }
}

/// One page per command: `vouchly.1`, `vouchly-vouchers.1`,
/// `vouchly-vouchers-generate.1`, ...
fn write_manpages(cmd: &clap::Command, page: &str, dir: &Path) {
    let mut buf = Vec::new();
    let rendered = clap_mangen::Man::new(cmd.clone().name(page.to_owned())).render(&mut buf);
    let path = dir.join(format!("{page}.1"));
    if let Err(e) = rendered.and_then(|()| fs::write(&path, &buf)) {
        panic!("failed to write {}: {e}", path.display());
    }

    for sub in cmd.get_subcommands().filter(|s| !s.is_hide_set()) {
        write_manpages(sub, &format!("{page}-{}", sub.get_name()), dir);
    }
}
