use anyhow::Result;

use chronicle_core::tokenize;

pub fn run(text: &str) -> Result<()> {
    // Shells pass "\n" literally; treat it as a newline.
    let text = text.replace("\\n", "\n");
    for token in tokenize(&text) {
        println!(
            "{:>4}..{:<4} {:<18} {:?}",
            token.span.start,
            token.span.end,
            format!("{:?}", token.kind),
            token.value
        );
    }
    Ok(())
}
