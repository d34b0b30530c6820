mod actors;
mod cli;
mod config;
mod io;
mod logging;
mod outside;
mod result;
mod types;
mod ui;

use std::{io::IsTerminal, process::ExitCode};

use actors::{Actor, DownloadActor, Job, Update};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, Sender};
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::{debug, info, warn};

use crate::{
    cli::{prompt_url, Args},
    config::Settings,
    logging::{init_logging, level_from_flags},
    outside::{Ffmpeg, StreamDownloader, StreamTransformer, Ytdl},
    ui::{StatusLine, TerminalUi},
};

fn main() -> Result<ExitCode> {
    // Initialize the environment & CLI
    let args = Args::parse();
    init_logging(level_from_flags(args.verbose, args.quiet))?;

    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply_to(&mut settings);
    debug!("Settings: {settings:?}");

    let ui = TerminalUi::new(!args.no_progress)?;

    // The URL entry: from the command line, or asked for
    let urls = if args.urls.is_empty() && std::io::stdin().is_terminal() {
        vec![prompt_url(std::io::stdin().lock())?]
    } else {
        args.urls.clone()
    };

    let jobs = match args.jobs(urls) {
        Ok(jobs) => jobs,
        Err(err) => {
            // Shown once, as a status line
            ui.print(&StatusLine::Error(err.to_string()));
            return Ok(ExitCode::FAILURE);
        }
    };

    std::fs::create_dir_all(&settings.out_dir)
        .into_diagnostic()
        .wrap_err("Could not create out directory")?;

    let (stream_dl, stream_tsf) = load_external_components(&settings)?;

    let board = std::thread::scope(|scope| -> Result<_> {
        let (input, output) = load_actor(scope, &stream_dl, &stream_tsf, &settings)?;

        // Fill the input channel with all the jobs
        for job in jobs {
            input.send(job).into_diagnostic()?;
        }

        // Drop the input to indicate the end of the input data
        drop(input);

        // The UI lives on this thread until the worker is done
        Ok(ui.run(output))
    })?;

    for (url, message) in board.failed() {
        warn!("Failed {url}: {message}");
    }

    let failed = board.failed().len();
    info!(
        "{} downloaded, {failed} failed",
        board.completed().len()
    );

    if failed > 0 {
        Err(miette!("{failed} download(s) failed"))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Load the external components
fn load_external_components(settings: &Settings) -> Result<(Ytdl, Ffmpeg)> {
    // Construct the handles concurrently as executing an external program
    // is not instantaneous. That way we can avoid adding the costs
    let (ytdl, ffmpeg) = std::thread::scope(|scope| -> Result<_> {
        let ytdl = std::thread::Builder::new()
            .name("probe-ytdl".to_owned())
            .spawn_scoped(scope, || Ytdl::new(settings.ytdl_program.as_deref()))
            .into_diagnostic()?;
        let ffmpeg = std::thread::Builder::new()
            .name("probe-ffmpeg".to_owned())
            .spawn_scoped(scope, || Ffmpeg::new(settings.ffmpeg_program.as_deref()))
            .into_diagnostic()?;

        let ytdl = ytdl
            .join()
            .map_err(|_| miette!("The yt-dlp probe thread panicked"))?;
        let ffmpeg = ffmpeg
            .join()
            .map_err(|_| miette!("The ffmpeg probe thread panicked"))?;

        Ok((ytdl, ffmpeg))
    })?;

    let ytdl = ytdl?;
    let ffmpeg = ffmpeg?;
    info!("Using {}", ytdl.program());

    Ok((ytdl, ffmpeg))
}

/// Spawn the download actor in the scope and return its input and output channels
fn load_actor<'scope, 'env>(
    scope: &'scope std::thread::Scope<'scope, 'env>,
    stream_dl: &'env dyn StreamDownloader,
    stream_tsf: &'env dyn StreamTransformer,
    settings: &'env Settings,
) -> Result<(Sender<Job>, Receiver<Update>)> {
    let mut dl_actor = DownloadActor::new(stream_dl, stream_tsf, settings);

    let (input, receive) = unbounded();
    dl_actor.set_receive_channel(receive);

    let (send, output) = unbounded();
    dl_actor.set_send_channel(send);

    std::thread::Builder::new()
        .name("download".to_owned())
        .spawn_scoped(scope, move || {
            if let Err(err) = dl_actor.run() {
                tracing::error!("Download worker stopped: {err:?}");
            }
        })
        .into_diagnostic()
        .wrap_err("Could not start the download worker")?;

    Ok((input, output))
}
