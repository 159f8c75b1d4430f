fn main() {
    // Writes build metadata (version, git commit) to $OUT_DIR/built.rs
    built::write_built_file().expect("Failed to acquire build-time information");
}
