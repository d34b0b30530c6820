use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};
use miette::{miette, Context, IntoDiagnostic};
use tracing::{debug, error, info};

use crate::{
    config::Settings,
    io::{named_tempfile_in, rename_output},
    outside::{DownloadRequest, StreamDownloader, StreamTransformer},
    result::{Error, Result},
    types::{Metadata, TrimRange},
};

use super::{Actor, Job, Update};

/// Background worker downloading, renaming and trimming videos one job at a time.
///
/// It only talks to the UI thread through its send channel.
#[derive(Debug)]
pub struct DownloadActor<'a> {
    stream_dl: &'a dyn StreamDownloader,
    stream_tsf: &'a dyn StreamTransformer,
    settings: &'a Settings,

    receive_channel: Option<Receiver<Job>>,
    send_channel: Option<Sender<Update>>,
}

impl Actor<Job, Update> for DownloadActor<'_> {
    fn set_receive_channel(&mut self, channel: Receiver<Job>) {
        self.receive_channel = Some(channel);
    }

    fn set_send_channel(&mut self, channel: Sender<Update>) {
        self.send_channel = Some(channel);
    }

    fn run(mut self) -> miette::Result<()> {
        let receive_channel = self
            .receive_channel
            .take()
            .ok_or_else(|| miette!("Receive channel not set"))?;

        let send_channel = self
            .send_channel
            .take()
            .ok_or_else(|| miette!("Send channel not set"))?;

        debug!("Actor started, waiting for a job");

        for job in receive_channel {
            debug!("Job received: {job:?}");

            let update = match self.process(&job, &send_channel) {
                Ok(path) => {
                    info!("Completed {}", path.display());
                    Update::Completed(path)
                }
                Err(err) => {
                    let message = error_message(err);
                    error!("Could not process {}: {message}", job.url);
                    Update::Failed {
                        url: job.url,
                        message,
                    }
                }
            };

            send_channel
                .send(update)
                .into_diagnostic()
                .wrap_err("Could not send message")?;

            debug!("Iteration completed. Waiting for next job");
        }

        debug!("All iterations completed. Stopping the actor.");
        Ok(())
    }
}

impl<'a> DownloadActor<'a> {
    pub fn new(
        stream_dl: &'a dyn StreamDownloader,
        stream_tsf: &'a dyn StreamTransformer,
        settings: &'a Settings,
    ) -> Self {
        Self {
            stream_dl,
            stream_tsf,
            settings,
            receive_channel: None,
            send_channel: None,
        }
    }

    /// Download, rename then trim. Return the final file path.
    fn process(&self, job: &Job, send: &Sender<Update>) -> Result<PathBuf> {
        let status = |text: String| {
            // Only fails if the UI is gone, in which case nobody is looking
            let _ = send.send(Update::Status(text));
        };

        status(format!("Fetching information for {}", job.url));
        let metadata = self
            .stream_dl
            .get_metadata(&job.url)
            .map_err(|err| err.wrap_err_with(|| "Could not get the video information"))?;
        debug!("Metadata: {metadata}");

        if let Some(range) = &job.trim {
            check_range(&metadata, range)?;
        }

        info!("Downloading '{}'", metadata.title);
        let _ = send.send(Update::Started {
            url: job.url.clone(),
            title: metadata.title.clone(),
        });

        let request = DownloadRequest {
            url: &job.url,
            out_dir: &self.settings.out_dir,
            format: &self.settings.format,
            output_template: &self.settings.output_template,
        };
        let mut path = self
            .stream_dl
            .download(&request, &mut |percent| {
                let _ = send.send(Update::Progress(percent));
            })
            .map_err(|err| err.wrap_err_with(|| "Could not download the video"))?;

        if let Some(new_name) = &job.rename {
            status(format!("Renaming to '{new_name}'"));
            path = rename_output(&path, new_name)?;
        }

        if let Some(range) = &job.trim {
            status(format!("Trimming {range}"));
            self.trim_in_place(&path, range)?;
        }

        Ok(path)
    }

    /// Trim into a temporary file next to `path`, then replace `path` with it.
    fn trim_in_place(&self, path: &Path, range: &TrimRange) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let ext = path.extension().and_then(|ext| ext.to_str());
        let tmp = named_tempfile_in(dir, ext)?;

        self.stream_tsf
            .trim(path, tmp.path(), range)
            .map_err(|err| err.wrap_err_with(|| "Could not trim the video"))?;

        tmp.persist(path)
            .map_err(|err| err.error)
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not replace {} with its trimmed version", path.display()))?;

        Ok(())
    }
}

/// Refuse ranges starting after the end of the stream, when its duration is known.
fn check_range(metadata: &Metadata, range: &TrimRange) -> Result<()> {
    match metadata.duration {
        Some(duration) if range.start().as_secs_f64() >= duration => Err(Error::Miette(miette!(
            "The trim start ({}) is past the end of the video ({duration:.0}s)",
            range.start()
        ))),
        _ => Ok(()),
    }
}

/// Flatten an error and its causes into one line for the status display.
fn error_message(err: Error) -> String {
    match err {
        Error::UnavailableStream => "Video unavailable".to_owned(),
        Error::Miette(report) => report
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": "),
    }
}
