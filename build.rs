fn main() {
    // ESP-IDF link arguments are only needed for flash builds; host builds
    // (tests, the server's path dependency) skip embuild entirely.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
