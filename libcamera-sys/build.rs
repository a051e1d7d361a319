// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Builds the C++ shim between libcamera and the cxx bridge.
//!
//! libcamera is located through pkg-config. Without it the crate builds
//! empty so the rest of the workspace still compiles on hosts without the
//! camera stack.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/shim.h");
    println!("cargo:rerun-if-changed=src/shim.cc");
    println!("cargo:rerun-if-env-changed=PKG_CONFIG_PATH");
    println!("cargo:rustc-check-cfg=cfg(has_libcamera)");

    let library = match pkg_config::Config::new()
        .atleast_version("0.0.5")
        .probe("libcamera")
    {
        Ok(library) => library,
        Err(e) => {
            println!("cargo:warning=libcamera not found through pkg-config: {}", e);
            println!("cargo:warning=libcamera-sys is built without bindings");
            return;
        }
    };

    println!("cargo:rustc-cfg=has_libcamera");
    println!("cargo:version={}", library.version);

    cxx_build::bridge("src/lib.rs")
        .file("src/shim.cc")
        .includes(&library.include_paths)
        .std("c++17")
        .flag_if_supported("-Wno-unused-parameter")
        .compile("libcamera-shim");
}
