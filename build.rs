fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only rerun if proto files change
    println!("cargo:rerun-if-changed=proto/logs/logs.proto");
    println!("cargo:rerun-if-changed=proto/rpc/rpc.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/logs/logs.proto", "proto/rpc/rpc.proto"], &["proto"])?;
    Ok(())
}
