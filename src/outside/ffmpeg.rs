use std::{
    ffi::OsString,
    fmt::Debug,
    path::Path,
};

use super::command::{assert_success_command, FFMPEG, FFXXX_DEFAULT_ARGS};
use crate::{result::Result, types::TrimRange};

pub trait StreamTransformer: Sync + Debug {
    /// Copy the part of the input stream inside the range to the output file.
    ///
    /// If the range has no end, the clip continues until the end of the stream.
    fn trim(&self, input: &Path, output: &Path, range: &TrimRange) -> Result<()>;
}

/// Interface for the [ffmpeg](https://ffmpeg.org) program
#[derive(Debug)]
pub struct Ffmpeg {
    program: String,
}

impl Ffmpeg {
    /// Verify that the `ffmpeg` binary is reachable
    pub fn new(program: Option<&str>) -> Result<Self> {
        let program = program.unwrap_or(FFMPEG);
        assert_success_command(program, |cmd| cmd.arg("-version"))
            .map_err(|err| err.wrap_err_with(|| format!("{program} is not usable")))?;

        Ok(Self {
            program: program.to_owned(),
        })
    }
}

/// Arguments of a stream-copy trim. `-ss` and `-to` come after `-i` to seek in the opened input.
fn trim_args(input: &Path, output: &Path, range: &TrimRange) -> Vec<OsString> {
    let mut args: Vec<OsString> = FFXXX_DEFAULT_ARGS.iter().map(OsString::from).collect();
    args.push(OsString::from("-y"));
    args.push(OsString::from("-i"));
    args.push(input.as_os_str().to_owned());
    args.push(OsString::from("-ss"));
    args.push(OsString::from(range.start().to_string()));
    if let Some(end) = range.end() {
        args.push(OsString::from("-to"));
        args.push(OsString::from(end.to_string()));
    }
    args.extend(["-c", "copy", "--"].map(OsString::from));
    args.push(output.as_os_str().to_owned());
    args
}

impl StreamTransformer for Ffmpeg {
    fn trim(&self, input: &Path, output: &Path, range: &TrimRange) -> Result<()> {
        let args = trim_args(input, output, range);
        assert_success_command(&self.program, |cmd| cmd.args(&args))
    }
}
