//! stow engines

use colored::Colorize;
use stowage_build::EngineKind;

pub fn handle() {
    println!("{}", "Container engines:".bold());
    for kind in EngineKind::ALL {
        let status = if kind.is_supported() {
            "supported".green()
        } else {
            "not supported yet".dimmed()
        };
        let default = if kind == EngineKind::default() {
            " (default)"
        } else {
            ""
        };
        println!("  {:<12} {}{}", kind.as_str().cyan(), status, default);
    }
}
