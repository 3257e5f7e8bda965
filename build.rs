fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let descriptor_path =
        std::path::PathBuf::from(std::env::var("OUT_DIR")?).join("chord_descriptor.bin");

    tonic_build::configure()
        .file_descriptor_set_path(descriptor_path)
        .compile(&["proto/chord.proto"], &["proto"])?;

    Ok(())
}
