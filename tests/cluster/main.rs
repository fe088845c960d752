mod fixtures;
mod test_api;
mod test_cluster;
