mod retrace_test;
mod tests;
