fn main() {
    // ESP-IDF environment (linker args, sysroot) is only needed for device builds.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
