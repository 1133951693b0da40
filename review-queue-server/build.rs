fn main() {
    built::write_built_file().expect("Failed to acquire build-time information");

    // Pass through a commit hash supplied by the packaging environment
    println!("cargo:rerun-if-env-changed=REVIEW_QUEUE_GIT_HASH");
    if let Ok(hash) = std::env::var("REVIEW_QUEUE_GIT_HASH") {
        println!("cargo:rustc-env=REVIEW_QUEUE_GIT_HASH={}", hash);
    }
}
