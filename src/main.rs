use anyhow::Result;

fn main() -> Result<()> {
    questline::run()?;
    Ok(())
}
