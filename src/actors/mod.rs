mod download_actor;
mod message;

use crossbeam_channel::{Receiver, Sender};
pub use download_actor::DownloadActor;
pub use message::*;

pub trait Actor<From, To> {
    fn set_receive_channel(&mut self, channel: Receiver<From>);

    fn set_send_channel(&mut self, channel: Sender<To>);

    fn run(self) -> miette::Result<()>;
}
