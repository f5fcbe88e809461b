fn main() {
    // The linker script only exists for the chip target; host builds run the test suite.
    if std::env::var_os("CARGO_FEATURE_ESP32C6").is_none() {
        return;
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");

    // Add ESP-IDF app descriptor metadata
    println!("cargo:rustc-env=ESP_IDF_VERSION=v5.0");
    println!("cargo:rustc-env=IDF_TARGET=esp32c6");
}
