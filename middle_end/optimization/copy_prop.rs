/*!

Copy propagation.

This optimization uses the result of the available copies analysis to figure
out whether propagating a copy is valid.

A copy is the pair `load A -> r; store r -> B`, recorded as `(A, B)`.  The
steps of the optimization are:

For each instruction i:
  For B ∈ use(i):
    If some copy (A, B) is available right before i:
    Then, replace B with A in i.

Available copies is a must analysis (the join is SET INTERSECTION), so a copy
is only used if it was made along every path reaching i and neither A nor B
was written since.  If several copies into B qualify, the one appearing first
in the function wins.

The pass never deletes instructions and never touches the variable an
instruction writes.  It builds a new graph and leaves its input alone.

 */

use log::debug;

use crate::commons::*;
use crate::middle_end::analysis::available_copies::AvailableCopies;
use crate::middle_end::analysis::AnalysisRun;
use crate::middle_end::cfg::*;
use crate::middle_end::ir::*;

/// The actual optimization pass.
pub fn copy_prop(cfg: &Cfg) -> Cfg {
    Cfg {
        globals: cfg.globals.clone(),
        functions: cfg.functions.iter().map(propagate).collect(),
    }
}

/// Run copy propagation on a whole instruction stream and hand back a stream
/// with the same blocks and functions.
pub fn copy_prop_program(program: Valid<Program>) -> Result<Valid<Program>, InternalError> {
    let cfg = Cfg::build(&program)?;
    copy_prop(&cfg)
        .flatten()
        .validate()
        .map_err(|e| InternalError::Revalidation(e.to_string()))
}

fn propagate(f: &Function) -> Function {
    let run = AnalysisRun::<AvailableCopies>::new(f);
    let copies = run.analysis().universe().to_vec();
    let results = run.solve();

    let mut rewritten = 0;
    let f = f.map_insts(|site, inst| {
        let available = results.ins(site);
        inst.map_uses(|v| {
            let copy = copies
                .iter()
                .find(|c| &c.dst == v && available.contains(*c))?;
            rewritten += 1;
            Some(copy.src.clone())
        })
    });

    debug!("copy propagation of @{}: {rewritten} operands rewritten", f.name);
    f
}
