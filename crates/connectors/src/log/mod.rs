pub mod laravel;
