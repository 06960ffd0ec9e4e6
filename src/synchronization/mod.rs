mod accumulate;
mod all_reduce;
mod frame;
mod local;
mod tcp;

pub use accumulate::{accumulate_avg, accumulate_scalar, accumulate_weighted_avg};
pub use all_reduce::AllReduce;
pub use local::LocalGroup;
pub use tcp::{SpanServer, TcpAllReduce};
