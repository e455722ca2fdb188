// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use super::CONFIG_FILE_TYPES_COMMA_SEPARATED;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file '{0}' doesn't have a recognised file extension! Valid extensions are: {}", *CONFIG_FILE_TYPES_COMMA_SEPARATED)]
    UnrecognisedExtension(PathBuf),

    #[error("Couldn't read config file '{path}': {err}")]
    Read {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("Couldn't decode toml structure from '{path}':\n{err}")]
    Toml {
        path: PathBuf,
        #[source]
        err: toml::de::Error,
    },

    #[error("Couldn't decode json structure from '{path}':\n{err}")]
    Json {
        path: PathBuf,
        #[source]
        err: serde_json::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
