fn main() {
    // Vendored protoc so no system installation is required.
    let protoc = protoc_bin_vendored::protoc_bin_path().expect("vendored protoc not found");
    std::env::set_var("PROTOC", protoc);

    let out_dir = std::path::PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set"));
    println!("cargo:rerun-if-changed=proto/cargomgr.proto");
    tonic_build::configure()
        .file_descriptor_set_path(out_dir.join("cargomgr_descriptor.bin"))
        .compile_protos(&["proto/cargomgr.proto"], &["proto/"])
        .expect("failed to compile proto/cargomgr.proto");
}
