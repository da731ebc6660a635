fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only rerun if proto files change
    println!("cargo:rerun-if-changed=proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &[
                "proto/events/v1/events.proto",
                "proto/inventory/v1/inventory.proto",
                "proto/payment/v1/payment.proto",
                "proto/iam/v1/iam.proto",
                "proto/envoy/service/auth/v3/external_auth.proto",
            ],
            &["proto"],
        )?;
    Ok(())
}
