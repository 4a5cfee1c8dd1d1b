//! Running workspace scripts
//!
//! Run with: cargo run --example basic

use std::sync::Arc;
use workshell::{InMemoryFs, Shell};

const BUILD_SCRIPT: &str = r#"
# $1: output directory
out=${1}
mkdir -p "$out"
for src in $(ls /project/src); do
    if grep -q main "/project/src/$src"; then
        echo "entry: $src"
    fi
    echo "$src" >> "$out/manifest.txt"
done
echo "files: $(cat "$out/manifest.txt" | grep -c .)"
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fs = InMemoryFs::new()
        .with_file("/project/build.sh", BUILD_SCRIPT)
        .with_file("/project/src/main.rs", "fn main() {}\n")
        .with_file("/project/src/lib.rs", "pub mod util;\n");

    let shell = Shell::builder().fs(Arc::new(fs)).cwd("/project").build();

    let output = shell.run("sh build.sh /project/dist").await?;
    println!("stdout:\n{}", output.stdout);
    println!("exit code: {}", output.code);

    // Script problems come back as output, not errors
    let output = shell.run("sh /project/missing.sh").await?;
    println!("missing script -> {} {}", output.code, output.stderr.trim_end());

    // An interactive-style session keeps variables between calls
    let mut session = Shell::new();
    session.exec("greeting=hello").await?;
    let result = session.exec("echo \"$greeting from $(pwd)\"").await?;
    print!("{}", result.stdout);

    Ok(())
}
