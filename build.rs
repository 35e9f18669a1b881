fn main() {
    println!("cargo:rerun-if-changed=sdkconfig.defaults");

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
