fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut prost_config = prost_build::Config::new();
    if std::env::var_os("PROTOC").is_none() {
        prost_config.protoc_executable(protoc_bin_vendored::protoc_bin_path()?);
    }
    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_with_config(prost_config, &["proto/loqui.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/loqui.proto");
    Ok(())
}
