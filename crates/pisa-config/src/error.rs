//! Configuration failures: a malformed config file or an invalid CLI
//! override. Both are fatal at startup, when `load` validates `Config`.

error_chain::error_chain! {
    errors {
        /// The config file at the given path could not be read.
        ReadFile(path: String, detail: String) {
            description("could not read configuration file")
            display("could not read configuration file {}: {}", path, detail)
        }
        /// The file's contents did not parse as valid TOML configuration.
        Parse(detail: String) {
            description("could not parse configuration")
            display("could not parse configuration: {}", detail)
        }
        /// A value, whether from the file or a CLI flag, failed validation.
        Invalid(field: String, detail: String) {
            description("invalid configuration value")
            display("invalid value for {}: {}", field, detail)
        }
    }
}
