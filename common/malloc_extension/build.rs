use std::env;

fn main() {
    // Test binaries export their own symbols so that `tests/exported_provider.rs` can stand in for
    // an allocator that was loaded ahead of this crate.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("linux") {
        println!("cargo:rustc-link-arg-tests=-rdynamic");
    }
    println!("cargo:rerun-if-changed=build.rs");
}
