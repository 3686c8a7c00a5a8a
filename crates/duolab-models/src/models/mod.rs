pub mod gpt2;
