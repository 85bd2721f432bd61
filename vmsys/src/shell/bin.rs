// Binary entry point for vmsys
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

fn main() -> Result<()> {
    if let Err(e) = vmsys::shell::run() {
        eprintln!("vmsys fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
