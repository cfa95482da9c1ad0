mod reopen_test;
