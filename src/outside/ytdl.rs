use std::{
    ffi::OsString,
    fmt::Debug,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use miette::{miette, Context, IntoDiagnostic};
use regex::Regex;
use tracing::{debug, warn};

use super::command::{assert_success_command, run_command, stream_command, Capture, YT_DL, YT_DLP};
use crate::{
    result::{bail, Error, Result},
    types::Metadata,
};

/// Prefix of the lines printed by the progress template.
/// Lets them be told apart from the final path printed after the download.
const PROGRESS_PREFIX: &str = "grabclip-progress:";

/// What to download and where.
#[derive(Debug, Clone)]
pub struct DownloadRequest<'a> {
    pub url: &'a str,
    pub out_dir: &'a Path,
    pub format: &'a str,
    pub output_template: &'a str,
}

/// Interface for downloading streams and their metadata
pub trait StreamDownloader: Sync + Debug {
    /// Get the video metadata without downloading it
    fn get_metadata(&self, url: &str) -> Result<Metadata>;

    /// Download the video, calling `on_progress` with the completion percentage
    /// each time the extractor reports it.
    ///
    /// Return the path of the downloaded file.
    fn download(
        &self,
        request: &DownloadRequest<'_>,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<PathBuf>;
}

/// Interface for the [yt-dlp](https://github.com/yt-dlp/yt-dlp) program,
/// or its ancestor [youtube-dl](https://github.com/ytdl-org/youtube-dl)
#[derive(Debug)]
pub struct Ytdl {
    program: String,
    flavor: Flavor,
}

/// The two extractors share their options, except for the progress and print ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    /// Supports `--progress-template` and `--print after_move:filepath`
    YtDlp,
    /// Only prints its usual `[download]` lines
    YoutubeDl,
}

impl Flavor {
    /// Guess the flavor from the program name, assuming `yt-dlp` when unsure
    fn of(program: &str) -> Self {
        let name = Path::new(program)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.contains(YT_DL) {
            Self::YoutubeDl
        } else {
            Self::YtDlp
        }
    }
}

/// What a line printed on stdout during a download means.
#[derive(Debug, PartialEq)]
enum DownloadLine {
    Progress(f64),
    Path(PathBuf),
    Other,
}

impl Ytdl {
    /// Verify that the given program is reachable.
    ///
    /// Without a program, try `yt-dlp` then `youtube-dl`.
    pub fn new(program: Option<&str>) -> Result<Self> {
        if let Some(program) = program {
            assert_success_command(program, |cmd| cmd.arg("--version"))
                .map_err(|err| err.wrap_err_with(|| format!("{program} is not usable")))?;
            return Ok(Self::with_program(program));
        }

        if assert_success_command(YT_DLP, |cmd| cmd.arg("--version")).is_ok() {
            Ok(Self::with_program(YT_DLP))
        } else if assert_success_command(YT_DL, |cmd| cmd.arg("--version")).is_ok() {
            warn!("{YT_DLP} not found, falling back to {YT_DL}");
            Ok(Self::with_program(YT_DL))
        } else {
            bail(format!("Neither {YT_DLP} nor {YT_DL} found"))
        }
    }

    fn with_program(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            flavor: Flavor::of(program),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl StreamDownloader for Ytdl {
    fn get_metadata(&self, url: &str) -> Result<Metadata> {
        let res = run_command(
            &self.program,
            |cmd| {
                cmd.arg("-q")
                    .arg("--no-warnings")
                    .arg("--no-playlist")
                    .arg("--skip-download")
                    .arg("-j")
                    .arg("--")
                    .arg(url)
            },
            Capture::STDOUT | Capture::STDERR,
        )?;

        let stderr = String::from_utf8_lossy(&res.stderr);
        if !res.status.success() {
            return Err(extractor_error(&stderr));
        }

        let output = String::from_utf8_lossy(&res.stdout);
        parse_metadata(&output)
    }

    fn download(
        &self,
        request: &DownloadRequest<'_>,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<PathBuf> {
        let args = download_args(self.flavor, request);

        let mut final_path = None;
        let res = stream_command(
            &self.program,
            |cmd| cmd.args(&args),
            |line| match parse_download_line(self.flavor, line) {
                DownloadLine::Progress(percent) => on_progress(percent),
                DownloadLine::Path(path) => final_path = Some(path),
                DownloadLine::Other => {}
            },
        )?;

        if !res.status.success() {
            return Err(extractor_error(&res.stderr));
        }

        let path = final_path.ok_or_else(|| {
            miette!("{} did not tell where the file was written", self.program)
        })?;
        debug!("Downloaded to {}", path.display());

        on_progress(100.0);
        Ok(path)
    }
}

/// Arguments of a download, the output template being joined to the output directory.
fn download_args(flavor: Flavor, request: &DownloadRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    match flavor {
        Flavor::YtDlp => {
            args.extend(["-q", "--progress", "--newline", "--no-playlist"].map(OsString::from));
            args.push(OsString::from("--progress-template"));
            args.push(OsString::from(format!(
                "download:{PROGRESS_PREFIX}%(progress._percent_str)s"
            )));
            args.extend(["--print", "after_move:filepath"].map(OsString::from));
        }
        Flavor::YoutubeDl => {
            args.extend(["--newline", "--no-playlist", "--no-warnings"].map(OsString::from));
        }
    }
    args.push(OsString::from("-f"));
    args.push(OsString::from(request.format));
    args.push(OsString::from("-o"));
    args.push(request.out_dir.join(request.output_template).into_os_string());
    args.push(OsString::from("--"));
    args.push(OsString::from(request.url));
    args
}

/// Sort a stdout line of a download.
///
/// `yt-dlp` prints the progress template and the final path, nothing else.
/// `youtube-dl` prints its usual status lines, the last file it names being the final one.
fn parse_download_line(flavor: Flavor, line: &str) -> DownloadLine {
    let line = line.trim();
    match flavor {
        Flavor::YtDlp => match parse_progress_line(line) {
            Some(percent) => DownloadLine::Progress(percent),
            None if line.is_empty() || line.starts_with(PROGRESS_PREFIX) => DownloadLine::Other,
            None => DownloadLine::Path(PathBuf::from(line)),
        },
        Flavor::YoutubeDl => parse_legacy_line(line),
    }
}

/// Lines of interest printed by `youtube-dl`, e.g.
/// `[download]  42.3% of 10.00MiB at 1.00MiB/s ETA 00:05`,
/// `[download] Destination: out/Video.f137.mp4`,
/// `[ffmpeg] Merging formats into "out/Video.mp4"`,
/// `[download] out/Video.mp4 has already been downloaded and merged`.
fn parse_legacy_line(line: &str) -> DownloadLine {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(concat!(
            r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%",
            r#"|^\[download\] Destination: (?P<dest>.+)$"#,
            r#"|^\[ffmpeg\] Merging formats into "(?P<merged>.+)"$"#,
            r"|^\[download\] (?P<done>.+?) has already been downloaded",
        ))
        .expect("youtube-dl line pattern is valid")
    });

    let Some(cap) = re.captures(line) else {
        return DownloadLine::Other;
    };

    if let Some(percent) = cap
        .name("percent")
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return DownloadLine::Progress(percent.clamp(0.0, 100.0));
    }

    ["dest", "merged", "done"]
        .into_iter()
        .find_map(|name| cap.name(name))
        .map_or(DownloadLine::Other, |m| DownloadLine::Path(PathBuf::from(m.as_str())))
}

/// Parse the JSON document printed with `-j`.
fn parse_metadata(output: &str) -> Result<Metadata> {
    let metadata = serde_json::from_str::<Metadata>(output)
        .into_diagnostic()
        .wrap_err("Could not parse the video metadata")?;
    Ok(metadata)
}

/// Extract the percentage from a line printed by the progress template.
///
/// The extractor pads the value and may wrap it in color codes,
/// e.g. `grabclip-progress: 42.3%`.
fn parse_progress_line(line: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)%").expect("progress pattern is valid"));

    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let percent = re.captures(rest)?.get(1)?.as_str().parse::<f64>().ok()?;
    Some(percent.clamp(0.0, 100.0))
}

/// Turn the stderr of a failed extractor run into an error.
///
/// The last `ERROR:` line is the most useful one. An unavailable video gets
/// its own error kind.
fn extractor_error(stderr: &str) -> Error {
    let errors: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("ERROR:"))
        .collect();

    let is_unavailable = errors
        .iter()
        .any(|line| line.to_lowercase().contains("unavailable"));
    if is_unavailable {
        return Error::UnavailableStream;
    }

    match errors.last() {
        Some(line) => Error::Miette(miette!("{}", line.trim_start_matches("ERROR:").trim())),
        None if !stderr.trim().is_empty() => Error::Miette(miette!("{}", stderr.trim())),
        None => Error::Miette(miette!("The download did not succeed")),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn progress_lines() {
        assert_eq!(parse_progress_line("grabclip-progress: 42.3%"), Some(42.3));
        assert_eq!(parse_progress_line("grabclip-progress:100.0%"), Some(100.0));
        assert_eq!(
            parse_progress_line("grabclip-progress:\u{1b}[0;94m  7.5%\u{1b}[0m"),
            Some(7.5)
        );
        assert_eq!(parse_progress_line("grabclip-progress: N/A"), None);
        assert_eq!(parse_progress_line("/tmp/My Video.mp4"), None);
        assert_eq!(parse_progress_line("[download] 50.0% of 10MiB"), None);
    }

    #[test]
    fn metadata_from_json() {
        let json = r#"{"id": "abc123", "title": "A video", "ext": "mp4", "duration": 61.5, "uploader": "someone"}"#;
        let metadata = parse_metadata(json).unwrap();
        assert_eq!(metadata.id, "abc123");
        assert_eq!(metadata.title, "A video");
        assert_eq!(metadata.ext, "mp4");
        assert_eq!(metadata.duration, Some(61.5));
    }

    #[test]
    fn metadata_without_duration() {
        let json = r#"{"id": "live", "title": "Live", "ext": "mp4", "duration": null}"#;
        assert_eq!(parse_metadata(json).unwrap().duration, None);
    }

    #[test]
    fn metadata_garbage() {
        assert!(parse_metadata("not json").is_err());
    }

    #[test]
    fn unavailable_video() {
        let stderr = indoc! {"
            WARNING: something harmless
            ERROR: [youtube] abc123: Video unavailable
        "};
        assert!(matches!(extractor_error(stderr), Error::UnavailableStream));
    }

    #[test]
    fn last_error_line_is_kept() {
        let stderr = indoc! {"
            ERROR: first problem
            ERROR: Unsupported URL: https://example.com
        "};
        let Error::Miette(report) = extractor_error(stderr) else {
            panic!("expected a report");
        };
        assert_eq!(report.to_string(), "Unsupported URL: https://example.com");
    }

    #[test]
    fn no_error_line() {
        let Error::Miette(report) = extractor_error("") else {
            panic!("expected a report");
        };
        assert_eq!(report.to_string(), "The download did not succeed");
    }

    fn request(out_dir: &Path) -> DownloadRequest<'_> {
        DownloadRequest {
            url: "https://example.com/watch?v=abc",
            out_dir,
            format: "best",
            output_template: "%(title)s.%(ext)s",
        }
    }

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn flavor_from_program_name() {
        assert_eq!(Flavor::of("yt-dlp"), Flavor::YtDlp);
        assert_eq!(Flavor::of("/opt/bin/yt-dlp.exe"), Flavor::YtDlp);
        assert_eq!(Flavor::of("youtube-dl"), Flavor::YoutubeDl);
        assert_eq!(Flavor::of("/usr/local/bin/youtube-dl"), Flavor::YoutubeDl);
        assert_eq!(Flavor::of("my-extractor"), Flavor::YtDlp);
    }

    #[test]
    fn yt_dlp_download_args() {
        let args = strings(download_args(Flavor::YtDlp, &request(Path::new("out"))));
        let template = Path::new("out")
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();
        assert_eq!(
            args,
            [
                "-q",
                "--progress",
                "--newline",
                "--no-playlist",
                "--progress-template",
                "download:grabclip-progress:%(progress._percent_str)s",
                "--print",
                "after_move:filepath",
                "-f",
                "best",
                "-o",
                template.as_str(),
                "--",
                "https://example.com/watch?v=abc",
            ]
        );
    }

    #[test]
    fn youtube_dl_download_args() {
        let args = strings(download_args(Flavor::YoutubeDl, &request(Path::new("out"))));
        assert!(!args.iter().any(|arg| arg == "--progress-template" || arg == "--print"));
        assert!(args.iter().any(|arg| arg == "--newline"));
        assert!(args.iter().any(|arg| arg == "--no-playlist"));
        assert_eq!(args.last().map(String::as_str), Some("https://example.com/watch?v=abc"));
    }

    #[test]
    fn yt_dlp_lines() {
        assert_eq!(
            parse_download_line(Flavor::YtDlp, "grabclip-progress: 12.5%"),
            DownloadLine::Progress(12.5)
        );
        assert_eq!(
            parse_download_line(Flavor::YtDlp, "grabclip-progress: N/A"),
            DownloadLine::Other
        );
        assert_eq!(parse_download_line(Flavor::YtDlp, "  "), DownloadLine::Other);
        assert_eq!(
            parse_download_line(Flavor::YtDlp, "/tmp/My Video.mp4\r"),
            DownloadLine::Path(PathBuf::from("/tmp/My Video.mp4"))
        );
    }

    #[test]
    fn youtube_dl_lines() {
        let line = |line| parse_download_line(Flavor::YoutubeDl, line);

        assert_eq!(
            line("[download]  42.3% of 10.00MiB at  1.00MiB/s ETA 00:05"),
            DownloadLine::Progress(42.3)
        );
        assert_eq!(
            line("[download] 100% of 10.00MiB in 00:10"),
            DownloadLine::Progress(100.0)
        );
        assert_eq!(
            line("[download] Destination: out/Video.f137.mp4"),
            DownloadLine::Path(PathBuf::from("out/Video.f137.mp4"))
        );
        assert_eq!(
            line(r#"[ffmpeg] Merging formats into "out/Video.mp4""#),
            DownloadLine::Path(PathBuf::from("out/Video.mp4"))
        );
        assert_eq!(
            line("[download] out/Video.mp4 has already been downloaded and merged"),
            DownloadLine::Path(PathBuf::from("out/Video.mp4"))
        );
        assert_eq!(line("[youtube] abc: Downloading webpage"), DownloadLine::Other);
    }

    #[cfg(unix)]
    mod with_script {
        use std::{fs, os::unix::fs::PermissionsExt};

        use super::*;

        /// Write an executable shell script standing in for the extractor
        fn fake_extractor(dir: &Path, name: &str, body: &str) -> Ytdl {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            Ytdl::with_program(&path.to_string_lossy())
        }

        #[test]
        fn download_reports_progress_and_path() {
            let dir = tempfile::tempdir().unwrap();
            let ytdl = fake_extractor(
                dir.path(),
                "yt-dlp",
                indoc! {"
                    echo 'grabclip-progress:  10.0%'
                    echo 'grabclip-progress:  55.5%'
                    echo '/videos/A video.mp4'
                "},
            );

            let mut progress = Vec::new();
            let path = ytdl
                .download(&request(dir.path()), &mut |percent| progress.push(percent))
                .unwrap();

            assert_eq!(path, PathBuf::from("/videos/A video.mp4"));
            assert_eq!(progress, [10.0, 55.5, 100.0]);
        }

        #[test]
        fn download_without_path_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let ytdl = fake_extractor(dir.path(), "yt-dlp", "echo 'grabclip-progress: 100.0%'");

            let err = ytdl.download(&request(dir.path()), &mut |_| {}).unwrap_err();
            let Error::Miette(report) = err else {
                panic!("expected a report");
            };
            assert!(report.to_string().contains("did not tell where the file was written"));
        }

        #[test]
        fn download_failure_uses_the_error_line() {
            let dir = tempfile::tempdir().unwrap();
            let ytdl = fake_extractor(
                dir.path(),
                "yt-dlp",
                "echo 'ERROR: [youtube] abc: Video unavailable' >&2; exit 1",
            );

            let err = ytdl.download(&request(dir.path()), &mut |_| {}).unwrap_err();
            assert!(matches!(err, Error::UnavailableStream));
        }

        #[test]
        fn youtube_dl_download() {
            let dir = tempfile::tempdir().unwrap();
            let ytdl = fake_extractor(
                dir.path(),
                "youtube-dl",
                indoc! {r#"
                    case "$*" in *--progress-template*) echo 'no such option' >&2; exit 2;; esac
                    echo '[download] Destination: /videos/A video.f137.mp4'
                    echo '[download]  30.0% of 1.00MiB'
                    echo '[download] 100% of 1.00MiB in 00:01'
                    echo '[ffmpeg] Merging formats into "/videos/A video.mp4"'
                "#},
            );

            let mut progress = Vec::new();
            let path = ytdl
                .download(&request(dir.path()), &mut |percent| progress.push(percent))
                .unwrap();

            assert_eq!(path, PathBuf::from("/videos/A video.mp4"));
            assert_eq!(progress, [30.0, 100.0, 100.0]);
        }
    }
}
