mod interface;
pub use interface::AsPoller;

mod poll;
pub use poll::PollPoller as Poller;
