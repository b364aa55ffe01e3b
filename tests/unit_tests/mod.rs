mod dispatch;
mod elimination;
mod options;
