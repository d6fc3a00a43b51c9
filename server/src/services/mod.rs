pub mod feed_poller;
