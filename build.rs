fn main() {
    println!("cargo:rerun-if-env-changed=SMARTHOME_DEVICE_TOKEN");
    println!("cargo:rerun-if-env-changed=SMARTHOME_WIFI_SSID");
    println!("cargo:rerun-if-env-changed=SMARTHOME_WIFI_PASSWORD");

    // Only firmware builds need the ESP-IDF environment exported.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
