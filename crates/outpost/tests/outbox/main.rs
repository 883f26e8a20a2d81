mod cycles;
mod writer;
