//! Command line options.

use anyhow::{anyhow, bail, Context};
use vesper_app::AppConfig;

/// Parsed viewer options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewerOptions {
    pub frames_in_flight: usize,
    pub vsync: bool,
    pub validation: bool,
    pub help: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        let config = AppConfig::default();
        Self {
            frames_in_flight: config.frames_in_flight,
            vsync: config.vsync,
            validation: config.validation,
            help: false,
        }
    }
}

impl ViewerOptions {
    /// Parse options from arguments, excluding the program name.
    pub fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames-in-flight" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames-in-flight needs a value"))?;
                    options.frames_in_flight = value
                        .parse()
                        .with_context(|| format!("Invalid frame count '{value}'"))?;
                }
                "--vsync" => options.vsync = true,
                "--no-validation" => options.validation = false,
                "-h" | "--help" => options.help = true,
                other => bail!("Unknown option '{other}' (see --help)"),
            }
        }
        Ok(options)
    }

    /// Apply the options to an app config.
    pub fn apply(&self, config: AppConfig) -> AppConfig {
        config
            .with_frames_in_flight(self.frames_in_flight)
            .with_vsync(self.vsync)
            .with_validation(self.validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ViewerOptions> {
        ViewerOptions::parse(args.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]).unwrap(), ViewerOptions::default());
    }

    #[test]
    fn all_flags() {
        let options = parse(&["--frames-in-flight", "3", "--vsync", "--no-validation"]).unwrap();
        assert_eq!(options.frames_in_flight, 3);
        assert!(options.vsync);
        assert!(!options.validation);
        assert!(!options.help);

        let config = options.apply(AppConfig::default());
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.vsync);
        assert!(!config.validation);
    }

    #[test]
    fn help_flag() {
        assert!(parse(&["-h"]).unwrap().help);
        assert!(parse(&["--help"]).unwrap().help);
    }

    #[test]
    fn bad_input_rejected() {
        assert!(parse(&["--frames-in-flight"]).is_err());
        assert!(parse(&["--frames-in-flight", "two"]).is_err());
        assert!(parse(&["--fast"]).is_err());
    }
}
