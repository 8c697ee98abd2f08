use anyhow::Result;

use super::command::PackArgs;
use crate::clipdb::pack;

pub fn cmd_pack(args: &PackArgs) -> Result<()> {
    let index = pack(&args.dir, &args.output)?;

    println!("Packed Clips");
    for (name, entry) in &index.clips {
        println!("  {name:<24}  {:>10} bytes at {}", entry.length, entry.offset);
    }
    println!("  Blob                      {}", index.blob);
    println!();
    Ok(())
}
