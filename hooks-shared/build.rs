//! Build script to compile the hook protocol definitions.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/kubevirt/hooks/info/info.proto",
                "proto/kubevirt/hooks/v1alpha3/api.proto",
            ],
            &["proto"],
        )?;

    println!("cargo:rerun-if-changed=proto/");
    Ok(())
}
