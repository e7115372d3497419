mod boundary;
mod history;
mod watcher;
